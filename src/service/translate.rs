//! Translation orchestration.
//!
//! Drives one translation attempt end to end: request validation, table
//! loading and ownership checks, schema filtering, prompt assembly, the model
//! call, usage metering, response interpretation, SQL validation, and the
//! audit record. Persistence and the model sit behind traits so the whole
//! flow is testable without a database or network.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::{ColumnSelection, FilteredTable, TableMetadata};
use super::interpret::{interpret, interpret_chart, ChartConfig, TranslationOutcome};
use super::llm::{ChatCompletionBackend, LlmError, Usage};
use super::prompt::{
    build_chart_system_prompt, build_messages, build_sql_system_prompt, ChartAxisConfig, Exchange,
};
use super::sql_guard::validate_sql;

pub const MAX_QUESTION_LEN: usize = 1000;
const SQL_HISTORY_PAIRS: i64 = 4;
const CHART_HISTORY_PAIRS: i64 = 3;

/// A table row as the store returns it, with the ownership facts the
/// orchestrator needs for authorization.
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub table: TableMetadata,
    pub schema_id: i64,
    pub owner_id: i64,
    pub dialect: String,
    pub database_name_prefix: Option<String>,
}

#[derive(Debug, Error)]
#[error("storage failure: {0}")]
pub struct StoreError(pub String);

pub trait SchemaStore: Send + Sync {
    /// Loads the requested tables with their owning schema facts. Unknown
    /// ids are simply absent from the result.
    fn load_tables(&self, ids: &[i64]) -> Result<Vec<StoredTable>, StoreError>;
}

pub trait UsageMeter: Send + Sync {
    /// Charges one request plus `total_tokens` against the user's monthly
    /// counters. Must be a single atomic increment on the storage side.
    fn charge(&self, user_id: i64, total_tokens: i64) -> Result<(), StoreError>;
}

/// One finished attempt, successful or not, bound for the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: i64,
    pub conversation_id: String,
    pub question: String,
    pub schema_context: String,
    pub dialect: String,
    pub raw_response: String,
    pub generated_sql: Option<String>,
    pub was_successful: bool,
    pub error_message: Option<String>,
    pub usage: Usage,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;
    /// The most recent attempts of a conversation, oldest first.
    fn recent(
        &self,
        user_id: i64,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<Exchange>, StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSelection {
    pub id: i64,
    #[serde(default)]
    pub full_schema: bool,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateRequest {
    pub question: String,
    pub tables: Vec<TableSelection>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "chart")]
    pub chart_config: Option<ChartAxisConfig>,
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("requested tables do not exist")]
    NotFound,
    #[error("requested tables are not accessible")]
    Forbidden,
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("model response could not be interpreted")]
    Malformed,
    #[error("generated SQL was rejected: {0}")]
    Rejected(String),
    #[error("internal failure")]
    Internal,
}

/// What a successful attempt hands back to the HTTP layer.
#[derive(Debug)]
pub enum TranslationReply {
    Sql {
        sql: String,
        thoughts: Option<String>,
        usage: Usage,
        conversation_id: String,
    },
    MissingContext {
        missing: Vec<String>,
        thoughts: Option<String>,
        conversation_id: String,
    },
    Chart {
        sql: String,
        chart_config: ChartConfig,
        thoughts: Option<String>,
        usage: Usage,
        conversation_id: String,
    },
    NotChartable {
        message: String,
        conversation_id: String,
    },
}

enum Flow {
    Sql,
    Chart,
}

pub struct Translator {
    backend: Arc<dyn ChatCompletionBackend>,
    store: Arc<dyn SchemaStore>,
    meter: Arc<dyn UsageMeter>,
    audit: Arc<dyn AuditSink>,
}

impl Translator {
    pub fn new(
        backend: Arc<dyn ChatCompletionBackend>,
        store: Arc<dyn SchemaStore>,
        meter: Arc<dyn UsageMeter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Translator {
            backend,
            store,
            meter,
            audit,
        }
    }

    pub async fn translate(
        &self,
        user_id: i64,
        request: TranslateRequest,
    ) -> Result<TranslationReply, TranslateError> {
        self.run(user_id, request, Flow::Sql).await
    }

    pub async fn translate_chart(
        &self,
        user_id: i64,
        request: TranslateRequest,
    ) -> Result<TranslationReply, TranslateError> {
        self.run(user_id, request, Flow::Chart).await
    }

    async fn run(
        &self,
        user_id: i64,
        request: TranslateRequest,
        flow: Flow,
    ) -> Result<TranslationReply, TranslateError> {
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(TranslateError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(TranslateError::InvalidRequest(format!(
                "question exceeds {} characters",
                MAX_QUESTION_LEN
            )));
        }
        if request.tables.is_empty() {
            return Err(TranslateError::InvalidRequest(
                "at least one table must be selected".to_string(),
            ));
        }

        // Load and authorize before anything touches the model. A request
        // that fails here costs the user nothing and is not audited.
        // A table may be listed more than once (with different column
        // selections), so resolution is checked against the distinct ids.
        let mut ids: Vec<i64> = request.tables.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        let stored = self.store.load_tables(&ids).map_err(|e| {
            error!("loading tables failed: {}", e);
            TranslateError::Internal
        })?;
        if stored.len() != ids.len() {
            return Err(TranslateError::NotFound);
        }
        if stored.iter().any(|t| t.owner_id != user_id) {
            warn!(user_id, "translation request against foreign tables");
            return Err(TranslateError::Forbidden);
        }
        // Mixing schemas is refused the same way as foreign tables: the
        // request as a whole is not accessible.
        let schema_id = stored[0].schema_id;
        if stored.iter().any(|t| t.schema_id != schema_id) {
            return Err(TranslateError::Forbidden);
        }
        let dialect = stored[0].dialect.clone();
        let db_prefix = stored[0].database_name_prefix.clone();

        // Filter in the caller's table order; the prompt promises the SELECT
        // column order matches what was rendered.
        let filtered: Vec<FilteredTable> = request
            .tables
            .iter()
            .map(|sel| {
                let loaded = stored
                    .iter()
                    .find(|t| t.table.id == sel.id)
                    .map(|t| &t.table);
                loaded.map(|table| {
                    let selection = ColumnSelection {
                        table_id: sel.id,
                        use_full_schema: sel.full_schema,
                        requested_columns: sel.columns.clone(),
                    };
                    FilteredTable::project(table, Some(&selection))
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(TranslateError::NotFound)?;

        let (system_prompt, history_pairs) = match flow {
            Flow::Sql => (
                build_sql_system_prompt(&dialect, &filtered, db_prefix.as_deref()),
                SQL_HISTORY_PAIRS,
            ),
            Flow::Chart => (
                build_chart_system_prompt(
                    &dialect,
                    &filtered,
                    db_prefix.as_deref(),
                    request.chart_config.as_ref(),
                ),
                CHART_HISTORY_PAIRS,
            ),
        };

        // The rendered context is captured before the call so the audit row
        // records exactly what the model saw, whatever happens next.
        let schema_context = super::context::render_schema_context(&filtered);

        let (conversation_id, history) = match request.conversation_id {
            Some(cid) if !cid.is_empty() => {
                let history = self
                    .audit
                    .recent(user_id, &cid, history_pairs)
                    .unwrap_or_else(|e| {
                        warn!("history load failed, continuing without: {}", e);
                        Vec::new()
                    });
                (cid, history)
            }
            _ => (Uuid::new_v4().to_string(), Vec::new()),
        };

        let messages = build_messages(system_prompt, &history, &question);

        let mut audit_entry = AuditEntry {
            user_id,
            conversation_id: conversation_id.clone(),
            question: question.clone(),
            schema_context,
            dialect: dialect.clone(),
            raw_response: String::new(),
            generated_sql: None,
            was_successful: false,
            error_message: None,
            usage: Usage::default(),
        };

        let completion = match self.backend.complete(messages).await {
            Ok(completion) => completion,
            Err(e) => {
                audit_entry.error_message = Some(e.to_string());
                self.record_audit(audit_entry);
                return Err(TranslateError::Model(e));
            }
        };
        audit_entry.raw_response = completion.content.clone();
        audit_entry.usage = completion.usage;

        // Billing happens the moment the model has answered, regardless of
        // whether the answer turns out to be usable.
        if let Err(e) = self
            .meter
            .charge(user_id, i64::from(completion.usage.total_tokens))
        {
            error!(user_id, "usage metering failed: {}", e);
            audit_entry.error_message = Some("usage metering failed".to_string());
            self.record_audit(audit_entry);
            return Err(TranslateError::Internal);
        }

        let outcome = match flow {
            Flow::Sql => interpret(&completion.content),
            Flow::Chart => interpret_chart(&completion.content),
        };

        match outcome {
            TranslationOutcome::SqlSuccess { sql, thoughts } => {
                if let Err(rejection) = validate_sql(&sql, &dialect) {
                    warn!(user_id, "generated SQL rejected: {}", rejection);
                    audit_entry.generated_sql = Some(sql);
                    audit_entry.error_message = Some(rejection.to_string());
                    self.record_audit(audit_entry);
                    return Err(TranslateError::Rejected(rejection.to_string()));
                }
                info!(user_id, conversation_id = %conversation_id, "translation succeeded");
                audit_entry.generated_sql = Some(sql.clone());
                audit_entry.was_successful = true;
                self.record_audit(audit_entry);
                Ok(TranslationReply::Sql {
                    sql,
                    thoughts,
                    usage: completion.usage,
                    conversation_id,
                })
            }
            TranslationOutcome::MissingContext { missing, thoughts } => {
                audit_entry.error_message = Some("missing_context".to_string());
                self.record_audit(audit_entry);
                Ok(TranslationReply::MissingContext {
                    missing,
                    thoughts,
                    conversation_id,
                })
            }
            TranslationOutcome::ChartSuccess {
                sql,
                chart_config,
                thoughts,
            } => {
                if let Err(rejection) = validate_sql(&sql, &dialect) {
                    warn!(user_id, "generated chart SQL rejected: {}", rejection);
                    audit_entry.generated_sql = Some(sql);
                    audit_entry.error_message = Some(rejection.to_string());
                    self.record_audit(audit_entry);
                    return Err(TranslateError::Rejected(rejection.to_string()));
                }
                audit_entry.generated_sql = Some(sql.clone());
                audit_entry.was_successful = true;
                self.record_audit(audit_entry);
                Ok(TranslationReply::Chart {
                    sql,
                    chart_config,
                    thoughts,
                    usage: completion.usage,
                    conversation_id,
                })
            }
            TranslationOutcome::NotChartable { message } => {
                audit_entry.error_message = Some("not_chartable".to_string());
                self.record_audit(audit_entry);
                Ok(TranslationReply::NotChartable {
                    message,
                    conversation_id,
                })
            }
            TranslationOutcome::Failure { reason } => {
                warn!(user_id, "uninterpretable model response: {}", reason);
                audit_entry.error_message = Some(reason);
                self.record_audit(audit_entry);
                Err(TranslateError::Malformed)
            }
        }
    }

    /// Audit failures must never mask the attempt's own outcome.
    fn record_audit(&self, entry: AuditEntry) {
        if entry.question.is_empty() && entry.raw_response.is_empty() {
            return;
        }
        if let Err(e) = self.audit.record(entry) {
            error!("failed to record audit entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::context::ColumnMeta;
    use crate::service::llm::ChatCompletion;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<Result<ChatCompletion, LlmError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<ChatCompletion, LlmError>>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn completion(content: &str, total_tokens: i32) -> Result<ChatCompletion, LlmError> {
            Ok(ChatCompletion {
                content: content.to_string(),
                usage: Usage {
                    prompt_tokens: total_tokens / 2,
                    completion_tokens: total_tokens - total_tokens / 2,
                    total_tokens,
                },
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatCompletionBackend for ScriptedBackend {
        async fn complete(&self, _: Vec<ChatMessage>) -> Result<ChatCompletion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    use crate::service::llm::ChatMessage;

    struct FakeStore {
        tables: Vec<StoredTable>,
    }

    impl SchemaStore for FakeStore {
        fn load_tables(&self, ids: &[i64]) -> Result<Vec<StoredTable>, StoreError> {
            Ok(self
                .tables
                .iter()
                .filter(|t| ids.contains(&t.table.id))
                .cloned()
                .collect())
        }
    }

    struct RecordingMeter {
        charges: Mutex<Vec<(i64, i64)>>,
        fail: bool,
    }

    impl UsageMeter for RecordingMeter {
        fn charge(&self, user_id: i64, total_tokens: i64) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError("meter down".to_string()));
            }
            self.charges.lock().unwrap().push((user_id, total_tokens));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        entries: Mutex<Vec<AuditEntry>>,
        history: Vec<Exchange>,
    }

    impl AuditSink for RecordingAudit {
        fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn recent(&self, _: i64, _: &str, limit: i64) -> Result<Vec<Exchange>, StoreError> {
            Ok(self.history.iter().take(limit as usize).cloned().collect())
        }
    }

    fn stored_table(id: i64, owner_id: i64, schema_id: i64) -> StoredTable {
        StoredTable {
            table: TableMetadata {
                id,
                name: format!("view_{}", id),
                columns: vec![ColumnMeta {
                    col: "state".to_string(),
                    sql_def: "VARCHAR(255)".to_string(),
                    desc: "State".to_string(),
                    origin: None,
                    instructions: None,
                    is_default: true,
                }],
            },
            schema_id,
            owner_id,
            dialect: "mariadb".to_string(),
            database_name_prefix: None,
        }
    }

    fn request(question: &str, table_ids: &[i64]) -> TranslateRequest {
        TranslateRequest {
            question: question.to_string(),
            tables: table_ids
                .iter()
                .map(|&id| TableSelection {
                    id,
                    full_schema: true,
                    columns: vec![],
                })
                .collect(),
            conversation_id: None,
            chart_config: None,
        }
    }

    fn translator(
        backend: Arc<ScriptedBackend>,
        store_tables: Vec<StoredTable>,
        meter_fails: bool,
    ) -> (Translator, Arc<RecordingMeter>, Arc<RecordingAudit>) {
        let meter = Arc::new(RecordingMeter {
            charges: Mutex::new(vec![]),
            fail: meter_fails,
        });
        let audit = Arc::new(RecordingAudit::default());
        let translator = Translator::new(
            backend,
            Arc::new(FakeStore {
                tables: store_tables,
            }),
            meter.clone(),
            audit.clone(),
        );
        (translator, meter, audit)
    }

    #[tokio::test]
    async fn successful_translation_bills_and_audits() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT state AS \"State\" FROM view_1", "thoughts": "direct"}"#,
            150,
        )]);
        let (t, meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let reply = t.translate(7, request("cases per state", &[1])).await.unwrap();
        match reply {
            TranslationReply::Sql { sql, usage, .. } => {
                assert!(sql.starts_with("SELECT"));
                assert_eq!(usage.total_tokens, 150);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        assert_eq!(*meter.charges.lock().unwrap(), vec![(7, 150)]);
        let entries = audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].was_successful);
        assert!(entries[0].generated_sql.is_some());
        assert!(entries[0].schema_context.contains("view_1"));
    }

    #[tokio::test]
    async fn missing_context_is_billed_and_audited_as_unsuccessful() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"error": "missing_context", "missing_context": ["no dob column"]}"#,
            90,
        )]);
        let (t, meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let reply = t.translate(7, request("date of birth?", &[1])).await.unwrap();
        assert!(matches!(reply, TranslationReply::MissingContext { .. }));
        assert_eq!(meter.charges.lock().unwrap().len(), 1);
        let entries = audit.entries.lock().unwrap();
        assert!(!entries[0].was_successful);
    }

    #[tokio::test]
    async fn rejected_sql_is_billed_and_audited_with_reason() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "DELETE FROM view_1"}"#,
            60,
        )]);
        let (t, meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let result = t.translate(7, request("wipe it", &[1])).await;
        assert!(matches!(result, Err(TranslateError::Rejected(_))));
        assert_eq!(meter.charges.lock().unwrap().len(), 1);
        let entries = audit.entries.lock().unwrap();
        assert!(!entries[0].was_successful);
        assert_eq!(entries[0].generated_sql.as_deref(), Some("DELETE FROM view_1"));
        assert!(entries[0].error_message.is_some());
    }

    #[tokio::test]
    async fn backend_failure_is_audited_but_never_billed() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Communication(
            "503 from upstream".to_string(),
        ))]);
        let (t, meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let result = t.translate(7, request("cases per state", &[1])).await;
        assert!(matches!(result, Err(TranslateError::Model(_))));
        assert!(meter.charges.lock().unwrap().is_empty());
        let entries = audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].raw_response.is_empty());
    }

    #[tokio::test]
    async fn metering_failure_surfaces_as_internal_after_audit() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT 1"}"#,
            10,
        )]);
        let (t, _meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], true);

        let result = t.translate(7, request("anything", &[1])).await;
        assert!(matches!(result, Err(TranslateError::Internal)));
        assert_eq!(audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn foreign_tables_fail_closed_before_the_model() {
        let backend = ScriptedBackend::new(vec![]);
        let (t, meter, audit) = translator(backend.clone(), vec![stored_table(1, 99, 1)], false);

        let result = t.translate(7, request("cases per state", &[1])).await;
        assert!(matches!(result, Err(TranslateError::Forbidden)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(meter.charges.lock().unwrap().is_empty());
        assert!(audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let backend = ScriptedBackend::new(vec![]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);
        let result = t.translate(7, request("q", &[1, 2])).await;
        assert!(matches!(result, Err(TranslateError::NotFound)));
    }

    #[tokio::test]
    async fn mixed_schemas_fail_closed() {
        let backend = ScriptedBackend::new(vec![]);
        let (t, meter, _) = translator(
            backend,
            vec![stored_table(1, 7, 1), stored_table(2, 7, 2)],
            false,
        );
        let result = t.translate(7, request("q", &[1, 2])).await;
        assert!(matches!(result, Err(TranslateError::Forbidden)));
        assert!(meter.charges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_table_id_with_different_selections_is_resolved() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT state AS \"State\" FROM view_1"}"#,
            20,
        )]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let req = TranslateRequest {
            question: "cases per state".to_string(),
            tables: vec![
                TableSelection {
                    id: 1,
                    full_schema: false,
                    columns: vec!["state".to_string()],
                },
                TableSelection {
                    id: 1,
                    full_schema: true,
                    columns: vec![],
                },
            ],
            conversation_id: None,
            chart_config: None,
        };
        let reply = t.translate(7, req).await.unwrap();
        assert!(matches!(reply, TranslationReply::Sql { .. }));
    }

    #[tokio::test]
    async fn overlong_question_is_invalid() {
        let backend = ScriptedBackend::new(vec![]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);
        let result = t
            .translate(7, request(&"x".repeat(MAX_QUESTION_LEN + 1), &[1]))
            .await;
        assert!(matches!(result, Err(TranslateError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn fresh_conversation_gets_a_generated_id() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT 1"}"#,
            5,
        )]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);
        let reply = t.translate(7, request("q", &[1])).await.unwrap();
        match reply {
            TranslationReply::Sql {
                conversation_id, ..
            } => assert!(Uuid::parse_str(&conversation_id).is_ok()),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn provided_conversation_id_is_kept() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT 1"}"#,
            5,
        )]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);
        let mut req = request("q", &[1]);
        req.conversation_id = Some("conv-abc".to_string());
        let reply = t.translate(7, req).await.unwrap();
        match reply {
            TranslationReply::Sql {
                conversation_id, ..
            } => assert_eq!(conversation_id, "conv-abc"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn chart_flow_returns_config() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT state AS x_axis, COUNT(*) AS y_axis FROM view_1 GROUP BY state",
               "chart_config": {"type": "bar", "xaxis_column": "x_axis", "series_column": "y_axis",
                                "series_name": "Total", "title": "Cases"}}"#,
            80,
        )]);
        let (t, meter, _) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let reply = t
            .translate_chart(7, request("cases per state", &[1]))
            .await
            .unwrap();
        match reply {
            TranslationReply::Chart { chart_config, .. } => {
                assert_eq!(chart_config.chart_type, "bar");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(meter.charges.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chart_without_config_is_malformed_but_billed() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"sql": "SELECT 1"}"#,
            40,
        )]);
        let (t, meter, audit) = translator(backend, vec![stored_table(1, 7, 1)], false);

        let result = t.translate_chart(7, request("chart it", &[1])).await;
        assert!(matches!(result, Err(TranslateError::Malformed)));
        assert_eq!(meter.charges.lock().unwrap().len(), 1);
        assert_eq!(audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn not_chartable_is_a_reply_not_an_error() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::completion(
            r#"{"error": "not_chartable", "message": "detail view"}"#,
            25,
        )]);
        let (t, _, _) = translator(backend, vec![stored_table(1, 7, 1)], false);
        let reply = t
            .translate_chart(7, request("show me case 1", &[1]))
            .await
            .unwrap();
        assert!(matches!(reply, TranslationReply::NotChartable { .. }));
    }
}
