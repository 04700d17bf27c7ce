//! Schema context rendering.
//!
//! Produces the textual description of the visible schema that is embedded in
//! every prompt. The rendered string is also persisted verbatim in the audit
//! trail as the record of what the model was shown, so rendering must be
//! deterministic: identical inputs yield byte-identical output.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One column of a queryable table/view, as stored in `schema_tables.column_metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Raw column name.
    #[serde(default)]
    pub col: String,
    /// SQL type definition, e.g. `VARCHAR(255)`.
    #[serde(default)]
    pub sql_def: String,
    /// Comma-separated synonym list; the first token is the canonical concept.
    #[serde(default)]
    pub desc: String,
    /// Entity the column originates from.
    #[serde(default)]
    pub origin: Option<String>,
    /// Free-text transformation the model must apply to this column.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Whether the column is part of the default projection.
    #[serde(default)]
    pub is_default: bool,
}

impl ColumnMeta {
    /// A column needs at least a name and a type to be renderable.
    pub fn is_renderable(&self) -> bool {
        !self.col.is_empty() && !self.sql_def.is_empty()
    }

    /// The canonical human label, used downstream as the SQL alias.
    pub fn primary_concept(&self) -> &str {
        match self.desc.split(',').next().map(str::trim) {
            Some(first) if !first.is_empty() => first,
            _ => &self.col,
        }
    }

    /// The remaining comma-separated tokens of the description.
    pub fn synonyms(&self) -> Vec<&str> {
        self.desc
            .split(',')
            .skip(1)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// A table definition loaded for one translation request. Never mutated;
/// request-scoped filtering produces a separate [`FilteredTable`].
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub id: i64,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableMetadata {
    /// Builds table metadata from the stored JSON column list. A missing or
    /// unparseable list degrades to "no columns" rather than failing the
    /// request; the renderer will emit the no-visible-columns warning.
    pub fn from_stored(id: i64, name: String, column_metadata: Option<&str>) -> Self {
        let columns = match column_metadata {
            Some(raw) => serde_json::from_str::<Vec<ColumnMeta>>(raw).unwrap_or_else(|e| {
                warn!("invalid column metadata for table '{}': {}", name, e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        TableMetadata { id, name, columns }
    }
}

/// Per-table directive controlling which columns reach the prompt.
#[derive(Debug, Clone, Default)]
pub struct ColumnSelection {
    pub table_id: i64,
    pub use_full_schema: bool,
    pub requested_columns: Vec<String>,
}

/// The request-scoped projection of a table that is actually rendered.
#[derive(Debug, Clone)]
pub struct FilteredTable {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
}

impl FilteredTable {
    /// Applies a column selection as a pure transform. The loaded table is
    /// left untouched.
    ///
    /// - no selection, or `use_full_schema`: every column, storage order;
    /// - explicit column list: exactly the named columns, in the caller's
    ///   order (this order drives the SELECT column order downstream);
    /// - otherwise: only the `is_default` columns, storage order.
    pub fn project(table: &TableMetadata, selection: Option<&ColumnSelection>) -> FilteredTable {
        let columns = match selection {
            None => table.columns.clone(),
            Some(sel) if sel.use_full_schema => table.columns.clone(),
            Some(sel) if !sel.requested_columns.is_empty() => sel
                .requested_columns
                .iter()
                .filter_map(|wanted| table.columns.iter().find(|c| &c.col == wanted))
                .cloned()
                .collect(),
            Some(_) => table
                .columns
                .iter()
                .filter(|c| c.is_default)
                .cloned()
                .collect(),
        };
        FilteredTable {
            name: table.name.clone(),
            columns,
        }
    }
}

const BLOCK_SEPARATOR: &str = "\n\n--------------------------------\n\n";

/// Renders the schema description fed to the model. Pure and deterministic.
pub fn render_schema_context(tables: &[FilteredTable]) -> String {
    let mut blocks = Vec::with_capacity(tables.len());

    for table in tables {
        let mut block = format!("TABLE/VIEW: `{}`\n", table.name);
        block.push_str("DESCRIPTION: Logical view of the data.\n");
        block.push_str("VISIBLE COLUMNS (only these are allowed):\n");

        let mut column_lines = Vec::new();
        for column in &table.columns {
            if !column.is_renderable() {
                continue;
            }

            let mut line = format!("  - `{}` ({})", column.col, column.sql_def);
            line.push_str(&format!(" | Concept: \"{}\"", column.primary_concept()));

            let synonyms = column.synonyms();
            if !synonyms.is_empty() {
                line.push_str(&format!(" | Synonyms: \"{}\"", synonyms.join("\", \"")));
            }

            line.push_str(&format!(
                " | Origin: \"{}\"",
                column.origin.as_deref().unwrap_or("System")
            ));

            // The loud tag breaks the visual pattern so the model treats the
            // instruction as mandatory, not as optional guidance.
            if let Some(instruction) = column.instructions.as_deref() {
                if !instruction.is_empty() {
                    line.push_str(&format!(
                        " | *** [MANDATORY_TRANSFORMATION]: \"{}\" ***",
                        instruction
                    ));
                }
            }

            column_lines.push(line);
        }

        if column_lines.is_empty() {
            block.push_str(
                "  (CRITICAL WARNING: there are no visible columns. The user must select them explicitly.)\n",
            );
        } else {
            block.push_str(&column_lines.join("\n"));
            block.push('\n');
            block.push_str(
                "  -- GOVERNANCE: the real schema has more columns (HIDDEN). Only the columns listed above may be used. SELECT * is FORBIDDEN.\n",
            );
        }

        blocks.push(block);
    }

    blocks.join(BLOCK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, is_default: bool) -> ColumnMeta {
        ColumnMeta {
            col: name.to_string(),
            sql_def: "VARCHAR(255)".to_string(),
            desc: format!("{} concept, {} alias", name, name),
            origin: Some("Case".to_string()),
            instructions: None,
            is_default,
        }
    }

    fn table(columns: Vec<ColumnMeta>) -> TableMetadata {
        TableMetadata {
            id: 1,
            name: "cases_view".to_string(),
            columns,
        }
    }

    #[test]
    fn render_is_deterministic() {
        let filtered = FilteredTable::project(
            &table(vec![column("code", true), column("state", false)]),
            None,
        );
        let first = render_schema_context(std::slice::from_ref(&filtered));
        let second = render_schema_context(std::slice::from_ref(&filtered));
        assert_eq!(first, second);
    }

    #[test]
    fn full_schema_ignores_requested_columns() {
        let t = table(vec![column("code", true), column("state", false)]);
        let selection = ColumnSelection {
            table_id: 1,
            use_full_schema: true,
            requested_columns: vec!["state".to_string()],
        };
        let with_request = FilteredTable::project(&t, Some(&selection));
        let without = FilteredTable::project(
            &t,
            Some(&ColumnSelection {
                table_id: 1,
                use_full_schema: true,
                requested_columns: vec![],
            }),
        );
        assert_eq!(
            render_schema_context(&[with_request]),
            render_schema_context(&[without])
        );
    }

    #[test]
    fn explicit_columns_keep_caller_order() {
        let t = table(vec![
            column("a", true),
            column("b", false),
            column("c", false),
        ]);
        let selection = ColumnSelection {
            table_id: 1,
            use_full_schema: false,
            requested_columns: vec!["c".to_string(), "a".to_string()],
        };
        let filtered = FilteredTable::project(&t, Some(&selection));
        let names: Vec<&str> = filtered.columns.iter().map(|c| c.col.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn empty_selection_keeps_only_defaults() {
        let t = table(vec![column("id", true), column("name", false)]);
        let selection = ColumnSelection {
            table_id: 1,
            use_full_schema: false,
            requested_columns: vec![],
        };
        let filtered = FilteredTable::project(&t, Some(&selection));
        let names: Vec<&str> = filtered.columns.iter().map(|c| c.col.as_str()).collect();
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn unrenderable_columns_are_dropped() {
        let mut broken = column("ghost", true);
        broken.sql_def = String::new();
        let filtered = FilteredTable::project(&table(vec![broken, column("code", true)]), None);
        let rendered = render_schema_context(&[filtered]);
        assert!(!rendered.contains("ghost"));
        assert!(rendered.contains("`code`"));
    }

    #[test]
    fn empty_table_renders_warning_not_empty_block() {
        let filtered = FilteredTable::project(&table(vec![]), None);
        let rendered = render_schema_context(&[filtered]);
        assert!(rendered.contains("CRITICAL WARNING"));
        assert!(!rendered.contains("GOVERNANCE"));
    }

    #[test]
    fn transformation_instruction_is_emphasized() {
        let mut state = column("state", true);
        state.instructions = Some("extract the value after the last backslash".to_string());
        let filtered = FilteredTable::project(&table(vec![state]), None);
        let rendered = render_schema_context(&[filtered]);
        assert!(rendered.contains("*** [MANDATORY_TRANSFORMATION]:"));
    }

    #[test]
    fn primary_concept_and_synonyms_split() {
        let c = ColumnMeta {
            col: "code".to_string(),
            sql_def: "INT".to_string(),
            desc: "Case Code, file number, expediente".to_string(),
            ..Default::default()
        };
        assert_eq!(c.primary_concept(), "Case Code");
        assert_eq!(c.synonyms(), vec!["file number", "expediente"]);
    }

    #[test]
    fn stored_metadata_parse_failure_degrades_to_no_columns() {
        let t = TableMetadata::from_stored(9, "broken".to_string(), Some("not json"));
        assert!(t.columns.is_empty());
    }
}
