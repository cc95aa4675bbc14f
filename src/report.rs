use serde::Serialize;

use crate::filter::Filter;
use crate::models::{Employee, QuestionDef, ReportSnapshot, ResponseRecord, Shop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Dashboard,
    EmployeeEvaluation,
}

/// Read-only listings shown next to the statistics.
#[derive(Debug, Clone, Default)]
pub struct SupplementalLists {
    pub shops: Vec<Shop>,
    pub employees: Vec<Employee>,
    /// Newest first, already capped.
    pub recent: Vec<ResponseRecord>,
    pub questions: Vec<QuestionDef>,
    pub selected_employee: Option<Employee>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub kind: ReportKind,
    pub filter: Filter,
    pub show_averages: bool,
    pub snapshot: ReportSnapshot,
    pub shops: Vec<Shop>,
    pub employees: Vec<Employee>,
    pub recent: Vec<ResponseRecord>,
    pub questions: Vec<QuestionDef>,
    pub selected_employee: Option<Employee>,
}

impl ReportPayload {
    pub fn selected_shop(&self) -> Option<&Shop> {
        let shop_id = self.filter.shop()?;
        self.shops.iter().find(|shop| shop.id == shop_id)
    }

    pub fn question(&self, id: i64) -> Option<&QuestionDef> {
        self.questions.iter().find(|question| question.id == id)
    }
}

pub fn assemble(
    kind: ReportKind,
    filter: Filter,
    show_averages: bool,
    snapshot: ReportSnapshot,
    supplemental: SupplementalLists,
) -> ReportPayload {
    let SupplementalLists {
        shops,
        employees,
        recent,
        questions,
        selected_employee,
    } = supplemental;

    ReportPayload {
        kind,
        filter,
        show_averages,
        snapshot,
        shops,
        employees,
        recent,
        questions,
        selected_employee,
    }
}
