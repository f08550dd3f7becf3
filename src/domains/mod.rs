pub mod agent;
pub mod lead;
pub mod training;

use serde_json::Value;

/// Whole, non-negative amount from a JSON number or a numeric string such
/// as `"$7,500"`. Fractions are rounded.
pub(crate) fn json_amount(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace([',', '$'], "").parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && number >= 0.0).then(|| number.round() as u64)
}
