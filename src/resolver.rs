use serde_json::Value;

use crate::models::AnswerMap;

/// Finds the answer for `question_id`, preferring the `"qN"` key over the bare `"N"` key,
/// and normalizes it to the string used as a histogram bucket.
pub fn resolve(answers: &AnswerMap, question_id: i64) -> Option<String> {
    let value = answers
        .get(&format!("q{question_id}"))
        .or_else(|| answers.get(&question_id.to_string()))?;
    scalar(value)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => {
            if let Some(whole) = number.as_i64() {
                Some(whole.to_string())
            } else if let Some(whole) = number.as_u64() {
                Some(whole.to_string())
            } else {
                // Adding 0.0 turns -0.0 into 0.0.
                number.as_f64().map(|real| format!("{:.0}", real.trunc() + 0.0))
            }
        }
        _ => None,
    }
}

/// Parses a resolved answer as a finite real number.
pub fn numeric_value(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|number| number.is_finite())
}
