use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::BaseError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = prompt_history)]
    pub struct PromptHistory {
        pub id: i64,
        pub user_id: i64,
        pub conversation_id: String,
        pub question: String,
        pub schema_context: String,
        pub dialect: String,
        pub raw_response: String,
        pub generated_sql: Option<String>,
        pub was_successful: bool,
        pub error_message: Option<String>,
        pub prompt_tokens: i32,
        pub completion_tokens: i32,
        pub total_tokens: i32,
        pub created_at: i64,
    }

    #[derive(Insertable, Deserialize, Debug)]
    #[diesel(table_name = prompt_history)]
    pub struct NewPromptHistory {
        pub user_id: i64,
        pub conversation_id: String,
        pub question: String,
        pub schema_context: String,
        pub dialect: String,
        pub raw_response: String,
        pub generated_sql: Option<String>,
        pub was_successful: bool,
        pub error_message: Option<String>,
        pub prompt_tokens: i32,
        pub completion_tokens: i32,
        pub total_tokens: i32,
        pub created_at: i64,
    }
}

impl PromptHistory {
    /// Appends one attempt record. Rows are never updated afterwards.
    pub fn insert(new_entry: &NewPromptHistory) -> DbResult<PromptHistory> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_entry = diesel::insert_into(prompt_history::table)
                .values(NewPromptHistoryDb::to_db(new_entry))
                .returning(PromptHistoryDb::as_returning())
                .get_result::<PromptHistoryDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to insert prompt history: {}",
                        e
                    )))
                })?;
            Ok(db_entry.from_db())
        })
    }

    /// The most recent rows of a conversation, newest first.
    pub fn recent_for_conversation(
        owner_id: i64,
        conversation_id_val: &str,
        limit: i64,
    ) -> DbResult<Vec<PromptHistory>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_rows = prompt_history::table
                .filter(
                    prompt_history::dsl::user_id
                        .eq(owner_id)
                        .and(prompt_history::dsl::conversation_id.eq(conversation_id_val)),
                )
                .order(prompt_history::dsl::created_at.desc())
                .limit(limit)
                .select(PromptHistoryDb::as_select())
                .load::<PromptHistoryDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to load prompt history for conversation '{}': {}",
                        conversation_id_val, e
                    )))
                })?;
            Ok(db_rows.into_iter().map(|db_r| db_r.from_db()).collect())
        })
    }
}
