use axum::{
    extract::Path,
    routing::{delete, get, post, put},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::database::schema_record::{NewSchemaRecord, SchemaRecord, UpdateSchemaData};
use crate::service::app_state::{create_state_router, StateRouter};
use crate::utils::{auth::AuthUser, HttpResult};

use super::error::BaseError;

const KNOWN_DIALECTS: &[&str] = &["mariadb", "mysql", "postgres", "generic"];

fn validate_dialect(dialect: &str) -> Result<(), BaseError> {
    if KNOWN_DIALECTS.contains(&dialect) {
        Ok(())
    } else {
        Err(BaseError::ParamInvalid(Some(format!(
            "unknown dialect '{}'; expected one of {:?}",
            dialect, KNOWN_DIALECTS
        ))))
    }
}

/// Loads a schema and checks it belongs to the caller. Foreign schemas are
/// reported as not found so ids cannot be probed.
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

#[derive(Debug, Deserialize)]
struct CreateSchemaRequest {
    name: String,
    dialect: String,
    #[serde(default)]
    database_name_prefix: Option<String>,
}

async fn insert_schema(
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateSchemaRequest>,
) -> Result<HttpResult<SchemaRecord>, BaseError> {
    if payload.name.trim().is_empty() {
        return Err(BaseError::ParamInvalid(Some(
            "schema name must not be empty".to_string(),
        )));
    }
    validate_dialect(&payload.dialect)?;

    let current_time = Utc::now().timestamp_millis();
    let new_schema = NewSchemaRecord {
        user_id: auth.id,
        name: payload.name.trim().to_string(),
        dialect: payload.dialect,
        database_name_prefix: payload.database_name_prefix,
        created_at: current_time,
        updated_at: current_time,
    };
    Ok(HttpResult::new(SchemaRecord::create(&new_schema)?))
}

async fn list_schemas(
    Extension(auth): Extension<AuthUser>,
) -> Result<HttpResult<Vec<SchemaRecord>>, BaseError> {
    Ok(HttpResult::new(SchemaRecord::list_by_user(auth.id)?))
}

async fn get_schema(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<HttpResult<SchemaRecord>, BaseError> {
    Ok(HttpResult::new(owned_schema(id, auth.id)?))
}

#[derive(Debug, Deserialize, Default)]
struct UpdateSchemaRequest {
    name: Option<String>,
    dialect: Option<String>,
    database_name_prefix: Option<Option<String>>,
}

async fn update_schema(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSchemaRequest>,
) -> Result<HttpResult<SchemaRecord>, BaseError> {
    owned_schema(id, auth.id)?;
    if let Some(dialect) = payload.dialect.as_deref() {
        validate_dialect(dialect)?;
    }

    let update_data = UpdateSchemaData {
        name: payload.name,
        dialect: payload.dialect,
        database_name_prefix: payload.database_name_prefix,
    };
    Ok(HttpResult::new(SchemaRecord::update(id, &update_data)?))
}

async fn delete_schema(
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<HttpResult<()>, BaseError> {
    owned_schema(id, auth.id)?;
    SchemaRecord::delete(id)?;
    Ok(HttpResult::new(()))
}

pub fn create_schema_router() -> StateRouter {
    create_state_router()
        .route("/schemas", post(insert_schema))
        .route("/schemas", get(list_schemas))
        .route("/schemas/{id}", get(get_schema))
        .route("/schemas/{id}", put(update_schema))
        .route("/schemas/{id}", delete(delete_schema))
}
