use axum::{
    extract::{Path, Query},
    routing::{delete, get, post, put},
    Extension, Json,
};
use serde::Deserialize;

use crate::database::schema_record::SchemaRecord;
use crate::database::schema_table::{SchemaTable, UpdateSchemaTableData};
use crate::service::app_state::{create_state_router, StateRouter};
use crate::service::context::ColumnMeta;
use crate::utils::{auth::AuthUser, HttpResult};

use super::error::BaseError;

fn owned_schema(schema_id: i64, owner_id: i64) -> Result<SchemaRecord, BaseError> {
    let schema = SchemaRecord::get_by_id(schema_id)?;
    if schema.user_id != owner_id {
        return Err(BaseError::NotFound(Some(format!(
            "Schema with id {} not found",
            schema_id
        ))));
    }
    Ok(schema)
}

fn owned_table(table_id: i64, owner_id: i64) -> Result<SchemaTable, BaseError> {
    let table = SchemaTable::get_by_id(table_id)?;
    owned_schema(table.schema_id, owner_id).map_err(|_| {
        BaseError::NotFound(Some(format!("Schema table with id {} not found", table_id)))
    })?;
    Ok(table)
}

/// Columns are stored as JSON text; reject anything that would not load back
/// as a column list, otherwise translation would silently degrade later.
fn serialize_columns(columns: &Option<Vec<ColumnMeta>>) -> Result<Option<String>, BaseError> {
    match columns {
        Some(cols) => serde_json::to_string(cols)
            .map(Some)
            .map_err(|e| BaseError::ParamInvalid(Some(format!("invalid column list: {}", e)))),
        None => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct UpsertTableRequest {
    schema_id: i64,
    table_name: String,
    #[serde(default)]
    columns: Option<Vec<ColumnMeta>>,
}

async fn upsert_table(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpsertTableRequest>,
) -> Result<HttpResult<SchemaTable>, BaseError> {
    if payload.table_name.trim().is_empty() {
        return Err(BaseError::ParamInvalid(Some(
            "table_name must not be empty".to_string(),
        )));
    }
    owned_schema(payload.schema_id, auth.id)?;

    let column_metadata = serialize_columns(&payload.columns)?;
    let table = SchemaTable::upsert(payload.schema_id, payload.table_name.trim(), column_metadata)?;
    Ok(HttpResult::new(table))
}

#[derive(Debug, Deserialize)]
struct ListBySchemaParams {
    schema_id: i64,
}

async fn list_tables(
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<ListBySchemaParams>,
) -> Result<HttpResult<Vec<SchemaTable>>, BaseError> {
    owned_schema(params.schema_id, auth.id)?;
    Ok(HttpResult::new(SchemaTable::list_by_schema(
        params.schema_id,
    )?))
}

async fn get_table(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<HttpResult<SchemaTable>, BaseError> {
    Ok(HttpResult::new(owned_table(id, auth.id)?))
}

#[derive(Debug, Deserialize, Default)]
struct UpdateTableRequest {
    table_name: Option<String>,
    columns: Option<Option<Vec<ColumnMeta>>>,
}

async fn update_table(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTableRequest>,
) -> Result<HttpResult<SchemaTable>, BaseError> {
    owned_table(id, auth.id)?;

    let column_metadata = match payload.columns {
        Some(columns) => Some(serialize_columns(&columns)?),
        None => None,
    };
    let update_data = UpdateSchemaTableData {
        table_name: payload.table_name,
        column_metadata,
    };
    Ok(HttpResult::new(SchemaTable::update(id, &update_data)?))
}

async fn delete_table(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<HttpResult<()>, BaseError> {
    owned_table(id, auth.id)?;
    SchemaTable::delete(id)?;
    Ok(HttpResult::new(()))
}

pub fn create_schema_table_router() -> StateRouter {
    create_state_router()
        .route("/schema-tables", post(upsert_table))
        .route("/schema-tables", get(list_tables))
        .route("/schema-tables/{id}", get(get_table))
        .route("/schema-tables/{id}", put(update_table))
        .route("/schema-tables/{id}", delete(delete_table))
}
