use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::BaseError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = schemas)]
    pub struct SchemaRecord {
        pub id: i64,
        pub user_id: i64,
        pub name: String,
        pub dialect: String,
        pub database_name_prefix: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Insertable, Deserialize, Debug)]
    #[diesel(table_name = schemas)]
    pub struct NewSchemaRecord {
        pub user_id: i64,
        pub name: String,
        pub dialect: String,
        pub database_name_prefix: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(AsChangeset, Deserialize, Debug)]
    #[diesel(table_name = schemas)]
    pub struct UpdateSchemaData {
        pub name: Option<String>,
        pub dialect: Option<String>,
        pub database_name_prefix: Option<Option<String>>,
    }
}

impl SchemaRecord {
    pub fn create(new_schema: &NewSchemaRecord) -> DbResult<SchemaRecord> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_schema = diesel::insert_into(schemas::table)
                .values(NewSchemaRecordDb::to_db(new_schema))
                .returning(SchemaRecordDb::as_returning())
                .get_result::<SchemaRecordDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!("Failed to insert schema: {}", e)))
                })?;
            Ok(db_schema.from_db())
        })
    }

    pub fn get_by_id(target_id: i64) -> DbResult<SchemaRecord> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_schema = schemas::table
                .find(target_id)
                .select(SchemaRecordDb::as_select())
                .first::<SchemaRecordDb>(conn)
                .map_err(|e| {
                    if matches!(e, diesel::result::Error::NotFound) {
                        BaseError::NotFound(Some(format!(
                            "Schema with id {} not found",
                            target_id
                        )))
                    } else {
                        BaseError::DatabaseFatal(Some(format!(
                            "Error fetching schema {}: {}",
                            target_id, e
                        )))
                    }
                })?;
            Ok(db_schema.from_db())
        })
    }

    pub fn list_by_user(owner_id: i64) -> DbResult<Vec<SchemaRecord>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_schemas = schemas::table
                .filter(schemas::dsl::user_id.eq(owner_id))
                .order(schemas::dsl::created_at.desc())
                .select(SchemaRecordDb::as_select())
                .load::<SchemaRecordDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!("Failed to list schemas: {}", e)))
                })?;
            Ok(db_schemas.into_iter().map(|db_s| db_s.from_db()).collect())
        })
    }

    pub fn update(target_id: i64, update_data: &UpdateSchemaData) -> DbResult<SchemaRecord> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            let db_schema = diesel::update(schemas::table.find(target_id))
                .set((
                    UpdateSchemaDataDb::to_db(update_data),
                    schemas::dsl::updated_at.eq(current_time),
                ))
                .returning(SchemaRecordDb::as_returning())
                .get_result::<SchemaRecordDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to update schema {}: {}",
                        target_id, e
                    )))
                })?;
            Ok(db_schema.from_db())
        })
    }

    /// Hard delete; removes the table definitions first since sqlite does not
    /// enforce the cascade without a pragma.
    pub fn delete(target_id: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::delete(
                schema_tables::table.filter(schema_tables::dsl::schema_id.eq(target_id)),
            )
            .execute(conn)
            .map_err(|e| {
                BaseError::DatabaseFatal(Some(format!(
                    "Failed to delete tables of schema {}: {}",
                    target_id, e
                )))
            })?;
            diesel::delete(schemas::table.find(target_id))
                .execute(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to delete schema {}: {}",
                        target_id, e
                    )))
                })
        })
    }
}
