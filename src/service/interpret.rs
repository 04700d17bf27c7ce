//! Interpretation of raw model output.
//!
//! Models occasionally wrap the JSON answer in prose or markdown fences, so
//! parsing first tries the whole payload and then falls back to extracting the
//! first balanced JSON object. Classification checks the error key before the
//! sql key: a response carrying both is a refusal, not an answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chart rendering directives the model returns alongside the SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub chart_type: String,
    #[serde(default)]
    pub xaxis_column: String,
    #[serde(default)]
    pub series_column: String,
    #[serde(default)]
    pub series_name: String,
    #[serde(default)]
    pub title: String,
}

/// What the model's answer turned out to be, before SQL validation.
#[derive(Debug)]
pub enum TranslationOutcome {
    SqlSuccess {
        sql: String,
        thoughts: Option<String>,
    },
    MissingContext {
        missing: Vec<String>,
        thoughts: Option<String>,
    },
    ChartSuccess {
        sql: String,
        chart_config: ChartConfig,
        thoughts: Option<String>,
    },
    NotChartable {
        message: String,
    },
    /// The payload was not interpretable; the reason is logged, not shown.
    Failure {
        reason: String,
    },
}

/// Extracts the first balanced `{...}` object from mixed text, honoring
/// string literals and escapes so braces inside strings do not miscount.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_payload(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if value.is_object() {
            return Some(value);
        }
    }
    let candidate = extract_json_object(raw)?;
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(Value::is_object)
}

fn thoughts_of(payload: &Value) -> Option<String> {
    payload
        .get("thoughts")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn sql_of(payload: &Value) -> Option<String> {
    payload
        .get("sql")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Classifies a raw response from the SQL translation flow.
pub fn interpret(raw: &str) -> TranslationOutcome {
    let Some(payload) = parse_payload(raw) else {
        return TranslationOutcome::Failure {
            reason: "response is not a JSON object".to_string(),
        };
    };

    // error key wins over sql: a refusal that also carries a query is
    // still a refusal.
    if let Some(error) = payload.get("error") {
        if error.as_str() != Some("missing_context") {
            return TranslationOutcome::Failure {
                reason: format!("unrecognized error value: {}", error),
            };
        }
        let missing = payload
            .get("missing_context")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return TranslationOutcome::MissingContext {
            missing,
            thoughts: thoughts_of(&payload),
        };
    }

    match sql_of(&payload) {
        Some(sql) => TranslationOutcome::SqlSuccess {
            sql,
            thoughts: thoughts_of(&payload),
        },
        None => TranslationOutcome::Failure {
            reason: "response carries neither an error nor a sql key".to_string(),
        },
    }
}

/// Classifies a raw response from the chart translation flow.
pub fn interpret_chart(raw: &str) -> TranslationOutcome {
    let Some(payload) = parse_payload(raw) else {
        return TranslationOutcome::Failure {
            reason: "response is not a JSON object".to_string(),
        };
    };

    if let Some(error) = payload.get("error") {
        if error.as_str() != Some("not_chartable") {
            return TranslationOutcome::Failure {
                reason: format!("unrecognized error value: {}", error),
            };
        }
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("This request cannot be represented as a chart.")
            .to_string();
        return TranslationOutcome::NotChartable { message };
    }

    let Some(sql) = sql_of(&payload) else {
        return TranslationOutcome::Failure {
            reason: "chart response carries neither an error nor a sql key".to_string(),
        };
    };

    // A chart answer without rendering directives is unusable by the
    // frontend, so it counts as a malformed response.
    let chart_config = payload
        .get("chart_config")
        .cloned()
        .and_then(|v| serde_json::from_value::<ChartConfig>(v).ok());
    match chart_config {
        Some(chart_config) => TranslationOutcome::ChartSuccess {
            sql,
            chart_config,
            thoughts: thoughts_of(&payload),
        },
        None => TranslationOutcome::Failure {
            reason: "chart response has sql but no usable chart_config".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_sql_response() {
        let outcome = interpret(r#"{"sql": "SELECT 1", "thoughts": "trivial"}"#);
        match outcome {
            TranslationOutcome::SqlSuccess { sql, thoughts } => {
                assert_eq!(sql, "SELECT 1");
                assert_eq!(thoughts.as_deref(), Some("trivial"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn error_key_wins_over_sql_key() {
        let outcome = interpret(
            r#"{"error": "missing_context", "sql": "SELECT 1", "missing_context": ["no dob column"]}"#,
        );
        match outcome {
            TranslationOutcome::MissingContext { missing, .. } => {
                assert_eq!(missing, vec!["no dob column".to_string()]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn recovers_json_from_surrounding_prose() {
        let raw = r#"Sure, here is the query: {"sql": "SELECT name AS \"Name\" FROM t"} hope that helps"#;
        match interpret(raw) {
            TranslationOutcome::SqlSuccess { sql, .. } => {
                assert_eq!(sql, r#"SELECT name AS "Name" FROM t"#);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let raw = r#"garbage {"sql": "SELECT '{' AS \"Brace\"", "thoughts": "odd literal"} trailing"#;
        match interpret(raw) {
            TranslationOutcome::SqlSuccess { sql, .. } => {
                assert!(sql.contains('{'));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn unknown_error_value_fails() {
        assert!(matches!(
            interpret(r#"{"error": "rate_limited"}"#),
            TranslationOutcome::Failure { .. }
        ));
        assert!(matches!(
            interpret_chart(r#"{"error": "missing_context"}"#),
            TranslationOutcome::Failure { .. }
        ));
    }

    #[test]
    fn non_json_payload_fails() {
        assert!(matches!(
            interpret("I cannot answer that."),
            TranslationOutcome::Failure { .. }
        ));
    }

    #[test]
    fn empty_sql_string_fails() {
        assert!(matches!(
            interpret(r#"{"sql": "   "}"#),
            TranslationOutcome::Failure { .. }
        ));
    }

    #[test]
    fn chart_response_with_config() {
        let raw = r#"{
            "sql": "SELECT state AS x_axis, COUNT(*) AS y_axis FROM t GROUP BY state",
            "chart_config": {"type": "bar", "xaxis_column": "x_axis", "series_column": "y_axis", "series_name": "Total", "title": "Cases"}
        }"#;
        match interpret_chart(raw) {
            TranslationOutcome::ChartSuccess { chart_config, .. } => {
                assert_eq!(chart_config.chart_type, "bar");
                assert_eq!(chart_config.series_name, "Total");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn chart_sql_without_config_is_a_failure() {
        assert!(matches!(
            interpret_chart(r#"{"sql": "SELECT 1"}"#),
            TranslationOutcome::Failure { .. }
        ));
    }

    #[test]
    fn not_chartable_uses_model_message() {
        match interpret_chart(r#"{"error": "not_chartable", "message": "detail view"}"#) {
            TranslationOutcome::NotChartable { message } => assert_eq!(message, "detail view"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
