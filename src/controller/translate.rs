use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::database::prompt_history::PromptHistory;
use crate::database::user::UserInfo;
use crate::service::app_state::{create_state_router, AppState, StateRouter};
use crate::service::translate::{TranslateRequest, TranslationReply};
use crate::utils::{auth::AuthUser, HttpResult};

use super::error::BaseError;

const HISTORY_PAGE_SIZE: i64 = 50;

fn reply_to_json(reply: TranslationReply) -> Value {
    match reply {
        TranslationReply::Sql {
            sql,
            thoughts,
            usage,
            conversation_id,
        } => json!({
            "sql": sql,
            "thoughts": thoughts,
            "usage": usage,
            "conversation_id": conversation_id,
        }),
        TranslationReply::MissingContext {
            missing,
            thoughts,
            conversation_id,
        } => json!({
            "feedback": {
                "type": "missing_context",
                "details": missing,
                "thoughts": thoughts,
            },
            "conversation_id": conversation_id,
        }),
        TranslationReply::Chart {
            sql,
            chart_config,
            thoughts,
            usage,
            conversation_id,
        } => json!({
            "sql": sql,
            "chart_config": chart_config,
            "thoughts": thoughts,
            "usage": usage,
            "conversation_id": conversation_id,
        }),
        TranslationReply::NotChartable {
            message,
            conversation_id,
        } => json!({
            "feedback": {
                "type": "not_chartable",
                "message": message,
            },
            "conversation_id": conversation_id,
        }),
    }
}

async fn translate(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserInfo>,
    Json(payload): Json<TranslateRequest>,
) -> Result<HttpResult<Value>, BaseError> {
    let reply = app_state.translator.translate(user.id, payload).await?;
    Ok(HttpResult::new(reply_to_json(reply)))
}

async fn translate_chart(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserInfo>,
    Json(payload): Json<TranslateRequest>,
) -> Result<HttpResult<Value>, BaseError> {
    let reply = app_state.translator.translate_chart(user.id, payload).await?;
    Ok(HttpResult::new(reply_to_json(reply)))
}

async fn conversation_history(
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> Result<HttpResult<Vec<Value>>, BaseError> {
    let rows =
        PromptHistory::recent_for_conversation(auth.id, &conversation_id, HISTORY_PAGE_SIZE)?;
    // schema_context and raw_response are audit internals, not API surface.
    let entries = rows
        .into_iter()
        .map(|row| {
            json!({
                "id": row.id,
                "conversation_id": row.conversation_id,
                "question": row.question,
                "generated_sql": row.generated_sql,
                "was_successful": row.was_successful,
                "error_message": row.error_message,
                "total_tokens": row.total_tokens,
                "created_at": row.created_at,
            })
        })
        .collect();
    Ok(HttpResult::new(entries))
}

pub fn create_translate_router() -> StateRouter {
    // Reading history never consumes quota; only the model-calling routes
    // sit behind the usage limit check.
    let limited = create_state_router()
        .route("/translate", post(translate))
        .route("/translate/chart", post(translate_chart))
        .layer(axum::middleware::from_fn(
            crate::utils::limit::usage_limit_middleware,
        ));

    create_state_router()
        .route(
            "/translate/history/{conversation_id}",
            get(conversation_history),
        )
        .merge(limited)
}
