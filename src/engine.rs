use chrono::FixedOffset;

use crate::aggregate;
use crate::filter::Filter;
use crate::models::ResponseRecord;
use crate::report::{self, ReportKind, ReportPayload, SupplementalLists};
use crate::store::ReportInputs;

#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub zone: FixedOffset,
    pub recent_limit: usize,
}

pub fn build_dashboard_report(
    inputs: &ReportInputs,
    filter: &Filter,
    settings: &ReportSettings,
    show_averages: bool,
) -> ReportPayload {
    build(ReportKind::Dashboard, inputs, *filter, settings, show_averages)
}

/// Employee evaluation view: same statistics, averages always shown.
pub fn build_employee_report(
    inputs: &ReportInputs,
    shop_id: Option<i64>,
    employee_id: Option<i64>,
    settings: &ReportSettings,
) -> ReportPayload {
    let filter = Filter::by_shop_and_employee(shop_id, employee_id);
    build(ReportKind::EmployeeEvaluation, inputs, filter, settings, true)
}

fn build(
    kind: ReportKind,
    inputs: &ReportInputs,
    filter: Filter,
    settings: &ReportSettings,
    show_averages: bool,
) -> ReportPayload {
    let snapshot = aggregate::aggregate(&inputs.responses, &inputs.questions, &filter, settings.zone);
    let supplemental = SupplementalLists {
        shops: inputs.shops.clone(),
        employees: inputs.employees.clone(),
        recent: recent_responses(&inputs.responses, &filter, settings.recent_limit),
        questions: aggregate::ordered_questions(&inputs.questions)
            .into_iter()
            .cloned()
            .collect(),
        selected_employee: inputs.selected_employee.clone(),
    };
    report::assemble(kind, filter, show_averages, snapshot, supplemental)
}

/// Newest matching responses, ties broken by id descending.
pub fn recent_responses(
    responses: &[ResponseRecord],
    filter: &Filter,
    limit: usize,
) -> Vec<ResponseRecord> {
    let mut recent: Vec<&ResponseRecord> = responses
        .iter()
        .filter(|record| filter.matches(record))
        .collect();
    recent.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    recent.into_iter().take(limit).cloned().collect()
}
