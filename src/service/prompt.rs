//! System prompt construction for the SQL and chart translation flows.
//!
//! Prompt text is pure string assembly; the same inputs must always produce
//! the same prompt so audit records stay reproducible.

use serde::Deserialize;

use super::context::{render_schema_context, FilteredTable};
use super::llm::ChatMessage;

/// Caller-supplied axis hints for the chart flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartAxisConfig {
    pub x_axis: Option<AxisSpec>,
    pub y_axis: Option<AxisSpec>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub chart_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AxisSpec {
    pub label: Option<String>,
    pub format: Option<String>,
}

/// A prior question/answer pair used as conversation context.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub raw_response: String,
}

fn prefix_rule(db_prefix: Option<&str>) -> String {
    match db_prefix {
        Some(prefix) if !prefix.is_empty() => format!(
            "    * MANDATORY database prefix: `{prefix}`. (E.g.: `FROM {prefix}.table`.)\n"
        ),
        _ => String::new(),
    }
}

/// Builds the system prompt for the SQL translation flow.
pub fn build_sql_system_prompt(
    dialect: &str,
    tables: &[FilteredTable],
    db_prefix: Option<&str>,
) -> String {
    let schema_context = render_schema_context(tables);
    let prefix_rule = prefix_rule(db_prefix);

    format!(
        r#"You are a Data Architect and SQL expert ({dialect}).
Your goal is to translate natural language into a precise SQL query while respecting strict business rules.

### GOLDEN RULE: TRANSFORMATIONS AND INSTRUCTIONS (HIGHEST PRIORITY)
Before writing any SQL, check whether a column carries the `[MANDATORY_TRANSFORMATION]` tag.
1.  **Absolute priority:** when an instruction exists it overrides the standard interpretation of the data. You MUST apply the requested logic in the `SELECT` and in the `WHERE`.
2.  **Backslash handling (paths/FQCN values):**
    * If the instruction asks to "extract the value after the last backslash" (e.g. `App\Entity\State` -> `State`), be careful with the escape character.
    * For MySQL/MariaDB use: `SUBSTRING_INDEX(column, '\\\\', -1)`. (Note: four backslashes are required in the JSON string to represent one literal backslash in the query.)
    * Never return the full path when only the final name was requested.

### METADATA AND ALIAS INSTRUCTIONS
1.  **Primary concept (aliases):**
    * Read the "VISIBLE COLUMNS" section.
    * You MUST use the "Concept" value as a friendly alias in the SELECT.
    * *Example:* if the column is `code` and the concept is "Case Code", the SQL must read: `SELECT t1.code AS "Case Code"`.

2.  **Type inference:**
    * If the user filters by a value (e.g. "intake state") and the column is not an ENUM, assume it is text.
    * Use `LIKE` or direct equality, applying the Golden Rule transformation when one exists.

### SQL SYNTAX
1.  **Dialect:** **{dialect}**.
2.  **Structure:**
    * Use explicit table aliases (e.g. `t1.column`).
    * **Dates:** use dynamic functions (`CURRENT_DATE`, `NOW()`) for relative concepts like "this month" or "today".
{prefix_rule}
### OUTPUT FORMAT (STRICT)
1.  **ORDER:** list the SELECT columns EXACTLY in the visual order of "VISIBLE COLUMNS".
2.  **ALIASES (mandatory):** EVERY column in the SELECT must carry `AS "Name"`. Never return raw column names.
3.  **`SELECT *` is FORBIDDEN.**

### SECURITY
* Only use columns listed under "VISIBLE COLUMNS".
* If the question needs data that is not in the schema, answer with the `missing_context` error.

### RESPONSE FORMAT (JSON)

**Success case:**
{{
  "sql": "SELECT SUBSTRING_INDEX(t1.state, '\\\\', -1) AS 'State', t1.code AS 'Code' FROM ...",
  "thoughts": "Found a cleanup instruction on 'state'. Applied SUBSTRING_INDEX and assigned aliases."
}}

**Error/ambiguity case:**
{{
  "error": "missing_context",
  "missing_context": ["Explain what is missing from the schema to answer."],
  "thoughts": "The user asks for 'date of birth' but that column is not visible."
}}

### DEFINED DATA SCHEMA (PARTIAL VIEW)
{schema_context}"#
    )
}

fn axis_config_section(chart_config: Option<&ChartAxisConfig>) -> String {
    let Some(cfg) = chart_config else {
        return String::new();
    };

    let mut section =
        String::from("\n### SPECIFIC AXIS CONFIGURATION (PROVIDED BY THE USER)\n");

    if let Some(x_axis) = &cfg.x_axis {
        section.push_str("**X AXIS:**\n");
        if let Some(label) = x_axis.label.as_deref().filter(|s| !s.is_empty()) {
            section.push_str(&format!("  - Label: \"{label}\"\n"));
        }
        if let Some(format) = x_axis.format.as_deref().filter(|s| !s.is_empty()) {
            section.push_str(&format!("  - Format: \"{format}\"\n"));
            section.push_str(
                "  - **MANDATORY:** apply this format in the SQL so the X axis labels stay readable.\n",
            );
        }
        section.push('\n');
    }

    if let Some(y_axis) = &cfg.y_axis {
        section.push_str("**Y AXIS:**\n");
        if let Some(label) = y_axis.label.as_deref().filter(|s| !s.is_empty()) {
            section.push_str(&format!("  - Label: \"{label}\"\n"));
        }
        if let Some(format) = y_axis.format.as_deref().filter(|s| !s.is_empty()) {
            section.push_str(&format!("  - Format: \"{format}\"\n"));
        }
        section.push('\n');
    }

    if let Some(title) = cfg.title.as_deref().filter(|s| !s.is_empty()) {
        section.push_str(&format!("**CHART TITLE:** \"{title}\"\n\n"));
    }

    if let Some(chart_type) = cfg.chart_type.as_deref().filter(|s| !s.is_empty()) {
        section.push_str(&format!("**FORCED CHART TYPE:** \"{chart_type}\"\n\n"));
    }

    section
}

/// Builds the system prompt for the chart translation flow.
pub fn build_chart_system_prompt(
    dialect: &str,
    tables: &[FilteredTable],
    db_prefix: Option<&str>,
    chart_config: Option<&ChartAxisConfig>,
) -> String {
    let schema_context = render_schema_context(tables);
    let prefix_rule = prefix_rule(db_prefix);
    let axis_config = axis_config_section(chart_config);

    format!(
        r#"You are a Data Visualization and SQL expert ({dialect}).
Your goal is to generate a SQL query that feeds a chart (ApexCharts) based on the user's request.

### GOLDEN RULE: TRANSFORMATIONS IN AGGREGATIONS (HIGHEST PRIORITY)
Before generating the SQL, check whether the column to chart carries the `[MANDATORY_TRANSFORMATION]` tag.

1.  **CLEANUP IN THE GROUP BY (CRITICAL):**
    * For the chart to be readable, **you MUST apply the transformation both in the `SELECT` and in the `GROUP BY`**.
    * If the instruction asks to "extract after the last backslash" (FQCN), use: `SUBSTRING_INDEX(column, '\\\\', -1)`.
    * *Wrong example:* `SELECT ... GROUP BY state` (this creates dirty labels like 'App\Entity\Closed').
    * *Right example:* `SELECT ... GROUP BY SUBSTRING_INDEX(state, '\\\\', -1)` (this creates clean labels like 'Closed').

2.  **ALIASES:**
    * Use the "Concept" listed in the schema to name the series when possible, but keep simple keys (`x_axis`, `y_axis`) for the technical configuration.

3.  **LABEL FORMATTING (CRITICAL FOR READABILITY):**
    * **DATES:** when a date format is specified, applying it both in SELECT and GROUP BY is MANDATORY.
    * **FORMAT EXAMPLES:**
        - "month_names" -> `DATE_FORMAT(date_col, '%M')` -> "January", "February", ...
        - "month_abbrev" -> `DATE_FORMAT(date_col, '%b')` -> "Jan", "Feb", ...
        - "quarters" -> `CONCAT('Q', QUARTER(date_col), ' ', YEAR(date_col))` -> "Q1 2025".
    * **NEVER** return raw codes like "2025-01", "2025-02" when the user asked for month names.

### VISUALIZATION RULES:

1.  **AGGREGATION IS MANDATORY:**
    * Charts summarize data. Your SQL must ALWAYS have a `GROUP BY` (unless a single KPI is requested).
    * Use `COUNT(*)`, `SUM(column)`, `AVG(column)` for the Y axis (series).
    * Use category columns (state, date, user) for the X axis (categories).

2.  **DATES ON THE X AXIS:**
    * For temporal evolution ("per month", "per day"), format the date in the SQL so it reads well and groups correctly.
    * MySQL example: `DATE_FORMAT(date_col, '%Y-%m')` for months.

3.  **CHART TYPES:** suggest the best type in `chart_config`:
    * Comparing categories (e.g. states) -> `"bar"` or `"pie"`.
    * Evolution over time (e.g. months) -> `"line"` or `"area"`.
{prefix_rule}
### RESPONSE FORMAT (JSON)
Return a JSON object with the exact structure the frontend (ApexCharts) needs to draw the chart.

**Response example:**
{{
  "sql": "SELECT SUBSTRING_INDEX(state, '\\\\', -1) AS x_axis, COUNT(*) AS y_axis FROM t1 GROUP BY SUBSTRING_INDEX(state, '\\\\', -1)",
  "chart_config": {{
    "type": "bar",
    "title": "Cases per State",
    "xaxis_column": "x_axis",
    "series_column": "y_axis",
    "series_name": "Total Cases"
  }},
  "thoughts": "Found a cleanup instruction on 'state'. Applied SUBSTRING_INDEX in the GROUP BY to get clean categories."
}}

### ERROR HANDLING
If the question cannot be charted (e.g. "show me the detail of case 1" or "list of users"), answer:
{{ "error": "not_chartable", "message": "This request asks for a detail view, not a chart." }}

### DATA SCHEMA
{schema_context}{axis_config}"#
    )
}

/// Assembles the full message sequence: system prompt, the most recent
/// well-formed history pairs (oldest first), then the user's question.
pub fn build_messages(
    system_prompt: String,
    history: &[Exchange],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    for exchange in history {
        if exchange.question.is_empty() || exchange.raw_response.is_empty() {
            continue;
        }
        messages.push(ChatMessage::user(exchange.question.clone()));
        messages.push(ChatMessage::assistant(exchange.raw_response.clone()));
    }

    messages.push(ChatMessage::user(question.to_string()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::context::{ColumnMeta, FilteredTable};

    fn sample_tables() -> Vec<FilteredTable> {
        vec![FilteredTable {
            name: "cases_view".to_string(),
            columns: vec![ColumnMeta {
                col: "state".to_string(),
                sql_def: "VARCHAR(255)".to_string(),
                desc: "State".to_string(),
                origin: Some("Case".to_string()),
                instructions: Some("extract after the last backslash".to_string()),
                is_default: true,
            }],
        }]
    }

    #[test]
    fn sql_prompt_is_stable_and_embeds_schema() {
        let tables = sample_tables();
        let a = build_sql_system_prompt("MariaDB", &tables, Some("crm"));
        let b = build_sql_system_prompt("MariaDB", &tables, Some("crm"));
        assert_eq!(a, b);
        assert!(a.contains("TABLE/VIEW: `cases_view`"));
        assert!(a.contains("MANDATORY database prefix: `crm`"));
        assert!(a.contains("missing_context"));
    }

    #[test]
    fn sql_prompt_omits_prefix_rule_when_unset() {
        let prompt = build_sql_system_prompt("MariaDB", &sample_tables(), None);
        assert!(!prompt.contains("MANDATORY database prefix"));
    }

    #[test]
    fn chart_prompt_carries_axis_configuration() {
        let cfg = ChartAxisConfig {
            x_axis: Some(AxisSpec {
                label: Some("Month".to_string()),
                format: Some("month_names".to_string()),
            }),
            y_axis: None,
            title: Some("Cases per month".to_string()),
            chart_type: Some("line".to_string()),
        };
        let prompt = build_chart_system_prompt("MariaDB", &sample_tables(), None, Some(&cfg));
        assert!(prompt.contains("SPECIFIC AXIS CONFIGURATION"));
        assert!(prompt.contains("\"Month\""));
        assert!(prompt.contains("FORCED CHART TYPE: \"line\""));
        assert!(prompt.contains("not_chartable"));
    }

    #[test]
    fn messages_skip_malformed_history_pairs() {
        let history = vec![
            Exchange {
                question: "how many cases?".to_string(),
                raw_response: "{\"sql\":\"SELECT ...\"}".to_string(),
            },
            Exchange {
                question: String::new(),
                raw_response: "{\"sql\":\"orphan\"}".to_string(),
            },
        ];
        let messages = build_messages("system".to_string(), &history, "and per state?");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "and per state?");
    }
}
