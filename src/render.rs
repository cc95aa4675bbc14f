use std::fmt::Write;

use crate::report::{ReportKind, ReportPayload};

pub fn json(payload: &ReportPayload) -> serde_json::Result<String> {
    serde_json::to_string_pretty(payload)
}

pub fn markdown(payload: &ReportPayload) -> String {
    let mut output = String::new();
    let snapshot = &payload.snapshot;

    let title = match payload.kind {
        ReportKind::Dashboard => "Survey Dashboard",
        ReportKind::EmployeeEvaluation => "Employee Evaluation",
    };
    let _ = writeln!(output, "# {title}");
    let _ = writeln!(output, "Generated for {}", scope_label(payload));
    let _ = writeln!(output);
    let _ = writeln!(output, "Total responses: {}", snapshot.total_count);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Responses by Day");
    if snapshot.counts_by_day.is_empty() {
        let _ = writeln!(output, "No responses recorded for this window.");
    } else {
        for (day, count) in &snapshot.counts_by_day {
            let _ = writeln!(output, "- {day}: {count}");
        }
    }

    if payload.kind == ReportKind::Dashboard {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Responses by Shop");
        if snapshot.counts_by_shop.is_empty() {
            let _ = writeln!(output, "No responses recorded for this window.");
        } else {
            let mut shops: Vec<(&String, &usize)> = snapshot.counts_by_shop.iter().collect();
            shops.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (shop, count) in shops {
                let _ = writeln!(output, "- {shop}: {count}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Questions");
    if snapshot.questions.is_empty() {
        let _ = writeln!(output, "No questions configured.");
    }
    for stats in &snapshot.questions {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {}. {} ({})",
            stats.display_order,
            stats.prompt,
            stats.kind.as_str()
        );
        let _ = writeln!(output, "{} answered", stats.answered());
        if payload.show_averages {
            if stats.average.count > 0 {
                let _ = writeln!(
                    output,
                    "Average {:.2} across {} numeric answers",
                    stats.average.mean, stats.average.count
                );
            } else {
                let _ = writeln!(output, "No numeric answers.");
            }
        }
        if stats.histogram.is_empty() {
            let _ = writeln!(output, "No answers.");
            continue;
        }
        let question = payload.question(stats.question_id);
        for (value, count) in &stats.histogram {
            match question.and_then(|q| q.choice_label(value)) {
                Some(label) => {
                    let _ = writeln!(output, "- {label} ({value}): {count}");
                }
                None => {
                    let _ = writeln!(output, "- {value}: {count}");
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Responses");
    if payload.recent.is_empty() {
        let _ = writeln!(output, "No responses recorded for this window.");
    } else {
        for record in &payload.recent {
            let _ = writeln!(
                output,
                "- #{} at {} by {} ({}): {} answers",
                record.id,
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.employee_name.as_deref().unwrap_or("unknown employee"),
                record.shop_name.as_deref().unwrap_or("unknown shop"),
                record.answers.len()
            );
        }
    }

    output
}

fn scope_label(payload: &ReportPayload) -> String {
    let shop = payload
        .selected_shop()
        .map(|shop| format!("{} ({})", shop.name, shop.city));
    let employee = payload
        .selected_employee
        .as_ref()
        .map(|employee| employee.name.clone());
    match (shop, employee) {
        (Some(shop), Some(employee)) => format!("{employee} at {shop}"),
        (Some(shop), None) => shop,
        (None, Some(employee)) => employee,
        (None, None) => "all shops".to_string(),
    }
}
