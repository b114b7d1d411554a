//! Numeric helpers shared by converters

use crate::error::ExtendError;
use serde_json::Value;

#[must_use]
pub fn precision_round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// JSON number, integral when the value has no fractional part
#[must_use]
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Numeric view of a frame value
#[must_use]
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Numeric request value or an invalid-value error
pub fn require_number(key: &str, value: &Value) -> Result<f64, ExtendError> {
    let number = match value {
        Value::Bool(_) => None,
        _ => to_number(value),
    };
    number.ok_or_else(|| ExtendError::invalid_value(key, format!("{value} is not a number")))
}

/// String request value or an invalid-value error
pub fn require_str<'a>(key: &str, value: &'a Value) -> Result<&'a str, ExtendError> {
    value
        .as_str()
        .ok_or_else(|| ExtendError::invalid_value(key, format!("{value} is not a string")))
}

/// Linear map from one range onto another, rounded to `precision`
#[must_use]
pub fn map_number_range(
    value: f64,
    from_low: f64,
    from_high: f64,
    to_low: f64,
    to_high: f64,
    precision: u32,
) -> f64 {
    let mapped = to_low + ((value - from_low) * (to_high - to_low)) / (from_high - from_low);
    precision_round(mapped, precision)
}

/// Frame value as an unsigned bitmap
#[must_use]
pub fn to_bitmap(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| to_number(value).filter(|n| *n >= 0.0).map(|n| n as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precision_round() {
        assert_eq!(precision_round(21.456, 1), 21.5);
        assert_eq!(precision_round(0.125, 2), 0.13);
        assert_eq!(precision_round(3.0, 0), 3.0);
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(12.0), json!(12));
        assert_eq!(number_value(12.5), json!(12.5));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(true)), Some(1.0));
        assert_eq!(to_number(&json!(false)), Some(0.0));
        assert_eq!(to_number(&json!(" 7.5 ")), Some(7.5));
        assert_eq!(to_number(&json!(null)), None);
        assert_eq!(to_bitmap(&json!(true)), Some(1));
    }

    #[test]
    fn test_require_number() {
        assert_eq!(require_number("x", &json!("42")).unwrap(), 42.0);
        assert!(require_number("x", &json!(true)).is_err());
    }

    #[test]
    fn test_map_number_range() {
        assert_eq!(map_number_range(127.0, 0.0, 254.0, 0.0, 100.0, 0), 50.0);
    }
}
