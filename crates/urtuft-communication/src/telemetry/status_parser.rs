//! Progress status line parsing
//!
//! The running program builds its status lines with string concatenation,
//! so they only look like JSON: keys are usually bare words and quoting is
//! inconsistent. Each line is normalized into strict JSON first and then
//! decoded with `serde_json`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use urtuft_core::TelemetryError;

/// One progress report from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(alias = "job_id")]
    pub job_id: String,
    /// Completed motions; may be out of range, the store clamps it.
    pub current: i64,
    pub total: u64,
}

fn bare_key_regex() -> &'static Regex {
    static BARE_KEY: OnceLock<Regex> = OnceLock::new();
    BARE_KEY.get_or_init(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("invalid bare key regex")
    })
}

fn bare_value_regex() -> &'static Regex {
    static BARE_VALUE: OnceLock<Regex> = OnceLock::new();
    BARE_VALUE.get_or_init(|| {
        Regex::new(r":\s*([A-Za-z0-9_\-]*[A-Za-z_][A-Za-z0-9_\-]*)\s*([,}])")
            .expect("invalid bare value regex")
    })
}

/// Rewrite a loose status line into strict JSON.
///
/// Single quotes become double quotes, bare keys are quoted, and bare word
/// values (an unquoted job id) are quoted. Numbers are left alone.
pub fn normalize_line(line: &str) -> String {
    let trimmed = line.trim().trim_matches('\0');
    let quoted = trimmed.replace('\'', "\"");
    let keys = bare_key_regex().replace_all(&quoted, "$1\"$2\":");
    bare_value_regex()
        .replace_all(&keys, ":\"$1\"$2")
        .into_owned()
}

/// Parse one status line.
pub fn parse_status_line(line: &str) -> Result<ProgressRecord, TelemetryError> {
    let normalized = normalize_line(line);
    if normalized.is_empty() {
        return Err(TelemetryError::Empty);
    }
    serde_json::from_str(&normalized).map_err(|e| TelemetryError::Malformed {
        line: line.trim().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job_id: &str, current: i64, total: u64) -> ProgressRecord {
        ProgressRecord {
            job_id: job_id.to_string(),
            current,
            total,
        }
    }

    #[test]
    fn test_normalize_bare_keys() {
        assert_eq!(
            normalize_line(r#"{jobId:"abc",current:5,total:10}"#),
            r#"{"jobId":"abc","current":5,"total":10}"#
        );
    }

    #[test]
    fn test_parse_generated_line() {
        let line = r#"{jobId:"4f1c2d3e-aaaa-4bbb-8ccc-123456789abc",current:12,total:40}"#;
        assert_eq!(
            parse_status_line(line).unwrap(),
            record("4f1c2d3e-aaaa-4bbb-8ccc-123456789abc", 12, 40)
        );
    }

    #[test]
    fn test_parse_loose_variants() {
        assert_eq!(
            parse_status_line(r#"{jobId: "x", current: 5, total: 10}"#).unwrap(),
            record("x", 5, 10)
        );
        assert_eq!(
            parse_status_line("{'jobId': 'x', 'current': 3, 'total': 10}\r\n").unwrap(),
            record("x", 3, 10)
        );
        assert_eq!(
            parse_status_line("{jobId: x, current: -2, total: 10}").unwrap(),
            record("x", -2, 10)
        );
        assert_eq!(
            parse_status_line(r#"{"job_id":"x","current":1,"total":2}"#).unwrap(),
            record("x", 1, 2)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_status_line("   \n"), Err(TelemetryError::Empty));
        assert!(matches!(
            parse_status_line("hello"),
            Err(TelemetryError::Malformed { .. })
        ));
        assert!(matches!(
            parse_status_line("{jobId:\"x\",current:1}"),
            Err(TelemetryError::Malformed { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_emitted_lines_parse(
            job_id in "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}",
            current in -5i64..100_000,
            total in 0u64..100_000,
            single_quotes in proptest::bool::ANY,
        ) {
            let line = if single_quotes {
                format!("{{jobId:'{}',current:{},total:{}}}", job_id, current, total)
            } else {
                format!("{{jobId:\"{}\",current:{},total:{}}}", job_id, current, total)
            };
            proptest::prop_assert_eq!(parse_status_line(&line), Ok(record(&job_id, current, total)));
        }
    }
}
