//! Scalar helpers over raw row values.

use serde_json::Value;

use super::Row;

/// Numeric reading of a cell: JSON numbers, and strings that parse as
/// finite numbers (thousands separators allowed).
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Whether a cell carries no value.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Plain string rendering of a cell, used for categorical labels and as
/// the distinctness key in cardinality counts.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Values of `field` across `rows`, skipping rows that lack it or hold a
/// blank value. At most `limit` values are returned.
pub fn sample_values<'a>(rows: &'a [Row], field: &str, limit: usize) -> Vec<&'a Value> {
    rows.iter()
        .filter_map(|row| row.get(field))
        .filter(|v| !is_blank(v))
        .take(limit)
        .collect()
}

/// Whether every sampled value of `field` reads as a number.
///
/// False when the field has no non-blank values.
pub fn is_numeric_field(rows: &[Row], field: &str, limit: usize) -> bool {
    let samples = sample_values(rows, field, limit);
    !samples.is_empty() && samples.iter().all(|v| as_number(v).is_some())
}
