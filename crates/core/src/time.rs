//! Timestamp normalization
//!
//! Backends persist timestamps as epoch integers in four different scales,
//! as floats, as numeric strings, or as ISO-8601 strings. Everything is
//! normalized to a single epoch-millisecond integer here; display
//! formatting renders local time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::Value;

/// Convert a raw timestamp value to epoch milliseconds.
///
/// Accepts an integer, a float, a numeric string, or an ISO-8601 string
/// (a trailing `Z` is treated as `+00:00`). Numeric inputs are taken as
/// already being milliseconds and are truncated toward zero. Returns
/// `None` for anything absent or unparseable; never panics.
pub fn to_milliseconds(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().map(|f| f.trunc() as i64)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(i) = s.parse::<i64>() {
                return Some(i);
            }
            if let Ok(f) = s.parse::<f64>() {
                return Some(f.trunc() as i64);
            }
            parse_iso8601(s)
        }
        _ => None,
    }
}

fn parse_iso8601(s: &str) -> Option<i64> {
    // fromisoformat-style tolerance: trailing Z means UTC
    let normalized = s
        .strip_suffix('Z')
        .map(|prefix| format!("{}+00:00", prefix))
        .unwrap_or_else(|| s.to_string());

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.timestamp_millis());
    }

    // Offset-less timestamps are treated as UTC
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Convert an epoch value of ambiguous scale to milliseconds.
///
/// Some backends store seconds, milliseconds, microseconds, or nanoseconds
/// in the same column with no schema to say which. This classifies by
/// order of magnitude: values >= 1e17 are nanoseconds, >= 1e14 are
/// microseconds, >= 1e11 are milliseconds, anything smaller is seconds.
/// The thresholds are a deliberate tolerance for that upstream ambiguity;
/// a value sitting near a boundary can be misclassified, and the bounds
/// are kept as-is rather than tuned.
pub fn normalize_epoch(raw: &Value) -> Option<i64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if !value.is_finite() {
        return None;
    }

    let magnitude = value.abs();
    let millis = if magnitude >= 1e17 {
        value / 1_000_000.0
    } else if magnitude >= 1e14 {
        value / 1_000.0
    } else if magnitude >= 1e11 {
        value
    } else {
        value * 1_000.0
    };

    Some(millis.trunc() as i64)
}

/// Render a raw epoch value as `YYYY-MM-DD HH:MM:SS` local time.
///
/// Applies [`normalize_epoch`] first; the literal `"Unknown"` is returned
/// whenever the value cannot be normalized or rendered.
pub fn format_display_timestamp(raw: &Value) -> String {
    let Some(millis) = normalize_epoch(raw) else {
        return "Unknown".to_string();
    };

    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_milliseconds_integer() {
        assert_eq!(to_milliseconds(&json!(1640995200000i64)), Some(1640995200000));
    }

    #[test]
    fn test_to_milliseconds_float_truncates_toward_zero() {
        assert_eq!(to_milliseconds(&json!(1234.9)), Some(1234));
        assert_eq!(to_milliseconds(&json!(-1234.9)), Some(-1234));
    }

    #[test]
    fn test_to_milliseconds_numeric_string() {
        assert_eq!(to_milliseconds(&json!("1640995200000")), Some(1640995200000));
        assert_eq!(to_milliseconds(&json!("1234.5")), Some(1234));
    }

    #[test]
    fn test_to_milliseconds_iso8601() {
        assert_eq!(
            to_milliseconds(&json!("2022-01-01T00:00:00Z")),
            Some(1640995200000)
        );
        assert_eq!(
            to_milliseconds(&json!("2022-01-01T00:00:00+00:00")),
            Some(1640995200000)
        );
        assert_eq!(
            to_milliseconds(&json!("2022-01-01T00:00:00")),
            Some(1640995200000)
        );
    }

    #[test]
    fn test_to_milliseconds_unparseable() {
        assert_eq!(to_milliseconds(&json!("not a timestamp")), None);
        assert_eq!(to_milliseconds(&Value::Null), None);
        assert_eq!(to_milliseconds(&json!({"nested": true})), None);
        assert_eq!(to_milliseconds(&json!("")), None);
    }

    #[test]
    fn test_to_milliseconds_round_trip() {
        let first = to_milliseconds(&json!("2022-01-01T00:00:00Z")).unwrap();
        let second = to_milliseconds(&json!(first.to_string())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalize_epoch_all_scales() {
        // 2022-01-01T00:00:00Z in s, ms, us, ns
        assert_eq!(normalize_epoch(&json!(1640995200i64)), Some(1640995200000));
        assert_eq!(normalize_epoch(&json!(1640995200000i64)), Some(1640995200000));
        assert_eq!(
            normalize_epoch(&json!(1640995200000000i64)),
            Some(1640995200000)
        );
        assert_eq!(
            normalize_epoch(&json!(1640995200000000000i64)),
            Some(1640995200000)
        );
    }

    #[test]
    fn test_normalize_epoch_numeric_string() {
        assert_eq!(normalize_epoch(&json!("1640995200")), Some(1640995200000));
    }

    #[test]
    fn test_normalize_epoch_rejects_non_numeric() {
        assert_eq!(normalize_epoch(&json!("soon")), None);
        assert_eq!(normalize_epoch(&Value::Null), None);
    }

    #[test]
    fn test_format_display_timestamp_unknown() {
        assert_eq!(format_display_timestamp(&Value::Null), "Unknown");
        assert_eq!(format_display_timestamp(&json!("garbage")), "Unknown");
    }

    #[test]
    fn test_format_display_timestamp_shape() {
        let rendered = format_display_timestamp(&json!(1640995200i64));
        assert_ne!(rendered, "Unknown");
        // YYYY-MM-DD HH:MM:SS
        assert_eq!(rendered.len(), 19);
        assert_eq!(&rendered[4..5], "-");
        assert_eq!(&rendered[10..11], " ");
    }
}
