use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw per-response payload: question key (`"qN"` or `"N"`) to answer value.
pub type AnswerMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Radio,
    Scale,
    Text,
}

impl QuestionKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "radio" => Some(Self::Radio),
            "scale" => Some(Self::Scale),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radio => "radio",
            Self::Scale => "scale",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionDef {
    pub id: i64,
    pub prompt: String,
    pub kind: QuestionKind,
    pub display_order: i32,
    pub choices: Vec<Choice>,
}

impl QuestionDef {
    pub fn choice_label(&self, value: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|choice| choice.value == value)
            .map(|choice| choice.label.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub id: i64,
    pub shop_id: i64,
    /// `None` when the referenced shop no longer exists.
    pub shop_name: Option<String>,
    pub employee_id: i64,
    pub employee_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub answers: AnswerMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub shop_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnswerAverage {
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub prompt: String,
    pub kind: QuestionKind,
    pub display_order: i32,
    pub histogram: BTreeMap<String, usize>,
    pub average: AnswerAverage,
}

impl QuestionStats {
    pub fn answered(&self) -> usize {
        self.histogram.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSnapshot {
    pub total_count: usize,
    pub counts_by_shop: BTreeMap<String, usize>,
    pub counts_by_day: BTreeMap<String, usize>,
    pub questions: Vec<QuestionStats>,
}
