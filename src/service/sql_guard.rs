//! SQL safety validation.
//!
//! Every statement produced by the model passes through here before it is
//! returned to a caller. Acceptance is structural, not textual: the statement
//! must parse under the schema's dialect into exactly one `SELECT` (or a CTE
//! that resolves to one). String scanning would miss stacked queries hidden in
//! comments or literals; the parser does not.

use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlValidationError {
    #[error("generated SQL does not parse: {0}")]
    Syntax(String),
    #[error("generated SQL contains {0} statements; exactly one is allowed")]
    MultipleStatements(usize),
    #[error("generated SQL is a {0} statement; only SELECT is allowed")]
    NotSelect(String),
    #[error("generated SQL is empty")]
    Empty,
}

fn dialect_for(name: &str) -> Box<dyn Dialect> {
    match name.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => Box::new(MySqlDialect {}),
        "postgres" | "postgresql" => Box::new(PostgreSqlDialect {}),
        _ => Box::new(GenericDialect {}),
    }
}

/// Human-readable statement kind for the rejection message.
fn statement_kind(statement: &Statement) -> String {
    match statement {
        Statement::Insert { .. } => "INSERT".to_string(),
        Statement::Update { .. } => "UPDATE".to_string(),
        Statement::Delete { .. } => "DELETE".to_string(),
        Statement::Drop { .. } => "DROP".to_string(),
        Statement::Truncate { .. } => "TRUNCATE".to_string(),
        other => other
            .to_string()
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_ascii_uppercase(),
    }
}

/// Accepts the SQL only if it is a single read-only query under `dialect`.
pub fn validate_sql(sql: &str, dialect: &str) -> Result<(), SqlValidationError> {
    if sql.trim().is_empty() {
        return Err(SqlValidationError::Empty);
    }

    let dialect = dialect_for(dialect);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| SqlValidationError::Syntax(e.to_string()))?;

    match statements.as_slice() {
        [] => Err(SqlValidationError::Empty),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(SqlValidationError::NotSelect(statement_kind(other))),
        many => Err(SqlValidationError::MultipleStatements(many.len())),
    }
}
