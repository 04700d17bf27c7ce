//! Shared application state and the production wiring of the translator.
//!
//! The orchestrator only knows the [`SchemaStore`], [`UsageMeter`] and
//! [`AuditSink`] traits; the implementations here back them with the
//! database layer.

use std::sync::Arc;

use axum::Router;
use chrono::Utc;

use crate::config::CONFIG;
use crate::database::prompt_history::{NewPromptHistory, PromptHistory};
use crate::database::schema_table::SchemaTable;
use crate::database::user::User;
use crate::service::context::TableMetadata;
use crate::service::llm::LlmClient;
use crate::service::prompt::Exchange;
use crate::service::translate::{
    AuditEntry, AuditSink, SchemaStore, StoreError, StoredTable, Translator, UsageMeter,
};

#[derive(Clone)]
pub struct AppState {
    pub translator: Arc<Translator>,
}

struct DbSchemaStore;

impl SchemaStore for DbSchemaStore {
    fn load_tables(&self, ids: &[i64]) -> Result<Vec<StoredTable>, StoreError> {
        let rows = SchemaTable::get_many_with_schema(ids)
            .map_err(|e| StoreError(format!("loading schema tables: {}", e)))?;
        Ok(rows
            .into_iter()
            .map(|(table, owner)| StoredTable {
                table: TableMetadata::from_stored(
                    table.id,
                    table.table_name,
                    table.column_metadata.as_deref(),
                ),
                schema_id: owner.schema_id,
                owner_id: owner.user_id,
                dialect: owner.dialect,
                database_name_prefix: owner.database_name_prefix,
            })
            .collect())
    }
}

struct DbUsageMeter;

impl UsageMeter for DbUsageMeter {
    fn charge(&self, user_id: i64, total_tokens: i64) -> Result<(), StoreError> {
        User::charge_usage(user_id, total_tokens)
            .map_err(|e| StoreError(format!("charging usage for user {}: {}", user_id, e)))
    }
}

struct DbAuditSink;

impl AuditSink for DbAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let new_entry = NewPromptHistory {
            user_id: entry.user_id,
            conversation_id: entry.conversation_id,
            question: entry.question,
            schema_context: entry.schema_context,
            dialect: entry.dialect,
            raw_response: entry.raw_response,
            generated_sql: entry.generated_sql,
            was_successful: entry.was_successful,
            error_message: entry.error_message,
            prompt_tokens: entry.usage.prompt_tokens,
            completion_tokens: entry.usage.completion_tokens,
            total_tokens: entry.usage.total_tokens,
            created_at: Utc::now().timestamp_millis(),
        };
        PromptHistory::insert(&new_entry)
            .map(|_| ())
            .map_err(|e| StoreError(format!("recording prompt history: {}", e)))
    }

    fn recent(
        &self,
        user_id: i64,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<Exchange>, StoreError> {
        let rows = PromptHistory::recent_for_conversation(user_id, conversation_id, limit)
            .map_err(|e| StoreError(format!("loading conversation history: {}", e)))?;
        // Rows come newest first; the prompt wants chronological order.
        Ok(rows
            .into_iter()
            .rev()
            .map(|row| Exchange {
                question: row.question,
                raw_response: row.raw_response,
            })
            .collect())
    }
}

pub fn create_app_state() -> Result<Arc<AppState>, crate::service::llm::LlmError> {
    let backend = LlmClient::from_config(&CONFIG.llm)?;
    let translator = Translator::new(
        Arc::new(backend),
        Arc::new(DbSchemaStore),
        Arc::new(DbUsageMeter),
        Arc::new(DbAuditSink),
    );
    Ok(Arc::new(AppState {
        translator: Arc::new(translator),
    }))
}

pub type StateRouter = Router<Arc<AppState>>;

pub fn create_state_router() -> StateRouter {
    Router::<Arc<AppState>>::new()
}
