//! Time parsing and formatting helpers.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::path::Path;

/// Format used for backup directory names.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parse a report timestamp.
///
/// Accepts RFC3339 strings, epoch seconds (floats, as pytest-json-report
/// writes them) and epoch milliseconds (integers above 10^11, as Vitest
/// writes them).
#[must_use]
pub fn parse_report_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw < 0.0 {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let millis = if raw > 1e11 { raw as i64 } else { (raw * 1000.0) as i64 };
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

/// Last modification time of a file, if the platform reports one.
#[must_use]
pub fn file_modified(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Human-readable duration (`850ms`, `12.40s`, `3m 05s`).
#[must_use]
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "n/a".to_string();
    }
    if secs < 1.0 {
        return format!("{:.0}ms", secs * 1000.0);
    }
    if secs < 60.0 {
        return format!("{secs:.2}s");
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = secs.round() as u64;
    format!("{}m {:02}s", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_report_timestamp(&json!("2025-01-15T12:00:00Z")).unwrap();
        assert_eq!(dt.year(), 2025);
    }

    #[test]
    fn test_parse_epoch_seconds_and_millis() {
        let secs = parse_report_timestamp(&json!(1_700_000_000.5)).unwrap();
        let millis = parse_report_timestamp(&json!(1_700_000_000_500_i64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_report_timestamp(&json!("yesterday")).is_none());
        assert!(parse_report_timestamp(&json!(null)).is_none());
        assert!(parse_report_timestamp(&json!(-5)).is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(12.4), "12.40s");
        assert_eq!(format_duration(185.0), "3m 05s");
        assert_eq!(format_duration(f64::NAN), "n/a");
    }
}
