use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::filter::Filter;
use crate::models::{AnswerAverage, QuestionDef, QuestionStats, ReportSnapshot, ResponseRecord};
use crate::resolver;

/// Calendar day of `at` in the reporting zone, as `YYYY-MM-DD`.
pub fn date_key(at: DateTime<Utc>, zone: FixedOffset) -> String {
    at.with_timezone(&zone).format("%Y-%m-%d").to_string()
}

/// Questions in report order: display order, then id.
pub fn ordered_questions(questions: &[QuestionDef]) -> Vec<&QuestionDef> {
    let mut ordered: Vec<&QuestionDef> = questions.iter().collect();
    ordered.sort_by_key(|question| (question.display_order, question.id));
    ordered
}

pub fn aggregate(
    responses: &[ResponseRecord],
    questions: &[QuestionDef],
    filter: &Filter,
    zone: FixedOffset,
) -> ReportSnapshot {
    let working: Vec<&ResponseRecord> = responses
        .iter()
        .filter(|record| filter.matches(record))
        .collect();

    let mut counts_by_shop: BTreeMap<String, usize> = BTreeMap::new();
    let mut counts_by_day: BTreeMap<String, usize> = BTreeMap::new();

    for record in &working {
        if record.shop_id != 0 {
            if let Some(name) = &record.shop_name {
                *counts_by_shop.entry(name.clone()).or_insert(0) += 1;
            }
        }
        *counts_by_day
            .entry(date_key(record.created_at, zone))
            .or_insert(0) += 1;
    }

    let questions: Vec<QuestionStats> = ordered_questions(questions)
        .into_iter()
        .map(|question| question_stats(question, &working))
        .collect();

    tracing::debug!(
        total = working.len(),
        shops = counts_by_shop.len(),
        days = counts_by_day.len(),
        questions = questions.len(),
        "aggregated survey responses"
    );

    ReportSnapshot {
        total_count: working.len(),
        counts_by_shop,
        counts_by_day,
        questions,
    }
}

fn question_stats(question: &QuestionDef, working: &[&ResponseRecord]) -> QuestionStats {
    let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
    let mut sum = 0.0;
    let mut count = 0usize;

    for record in working {
        let Some(value) = resolver::resolve(&record.answers, question.id) else {
            continue;
        };
        if let Some(number) = resolver::numeric_value(&value) {
            sum += number;
            count += 1;
        }
        *histogram.entry(value).or_insert(0) += 1;
    }

    QuestionStats {
        question_id: question.id,
        prompt: question.prompt.clone(),
        kind: question.kind,
        display_order: question.display_order,
        histogram,
        average: AnswerAverage {
            mean: if count == 0 { 0.0 } else { sum / count as f64 },
            count,
        },
    }
}
