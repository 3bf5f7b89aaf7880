//! Timezone-aware timestamp parsing for dataset dates

use crate::core::error::ConfigError;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_yaml::Value;

/// Accepted layouts besides RFC 3339; all of them require an offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Parse a date-time that must carry an explicit timezone.
///
/// YAML scalars are compared as strings, so a bare `2016-11-07T09:11:30`
/// and a quoted `"2016-11-07T09:11:30"` are treated alike and both fail.
pub fn parse_timestamp(value: &Value, field: &str) -> Result<DateTime<FixedOffset>, ConfigError> {
    let raw = match value {
        Value::String(s) => s.trim(),
        other => {
            return Err(invalid(field, &format!("{:?}", other), "expected a date-time string"));
        }
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts);
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }

    let reason = if looks_naive(raw) {
        "missing timezone information"
    } else {
        "not a recognized date-time"
    };
    Err(invalid(field, raw, reason))
}

fn looks_naive(raw: &str) -> bool {
    let naive_formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    naive_formats
        .iter()
        .any(|f| NaiveDateTime::parse_from_str(raw, f).is_ok())
        || chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<DateTime<FixedOffset>, ConfigError> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        parse_timestamp(&value, "train_start_date")
    }

    #[test]
    fn test_accepts_offset_forms() {
        for yaml in [
            "2016-11-07T09:11:30+01:00",
            "\"2016-11-07T09:11:30Z\"",
            "2016-11-07 09:11:30+01:00",
            "'2016-11-07T09:11:30.123+0000'",
        ] {
            let ts = parse(yaml).unwrap_or_else(|e| panic!("{} should parse: {}", yaml, e));
            assert_eq!(ts.format("%Y-%m-%d").to_string(), "2016-11-07");
        }
    }

    #[test]
    fn test_missing_timezone_fails_quoted_and_bare() {
        for yaml in ["2016-11-07T09:11:30", "\"2016-11-07T09:11:30\"", "2016-11-07"] {
            match parse(yaml) {
                Err(ConfigError::InvalidTimestamp { reason, .. }) => {
                    assert!(reason.contains("timezone"), "unexpected reason: {}", reason)
                }
                other => panic!("expected InvalidTimestamp for {}, got {:?}", yaml, other),
            }
        }
    }

    #[test]
    fn test_non_string_fails() {
        assert!(matches!(parse("12345"), Err(ConfigError::InvalidTimestamp { .. })));
    }
}
