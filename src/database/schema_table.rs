use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::BaseError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

/// Ownership and dialect facts about the schema a table belongs to.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaOwner {
    pub schema_id: i64,
    pub user_id: i64,
    pub dialect: String,
    pub database_name_prefix: Option<String>,
}

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = schema_tables)]
    pub struct SchemaTable {
        pub id: i64,
        pub schema_id: i64,
        pub table_name: String,
        pub column_metadata: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Insertable, Deserialize, Debug)]
    #[diesel(table_name = schema_tables)]
    pub struct NewSchemaTable {
        pub schema_id: i64,
        pub table_name: String,
        pub column_metadata: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(AsChangeset, Deserialize, Debug)]
    #[diesel(table_name = schema_tables)]
    pub struct UpdateSchemaTableData {
        pub table_name: Option<String>,
        pub column_metadata: Option<Option<String>>,
    }
}

impl SchemaTable {
    /// Insert-or-update keyed by (schema_id, table_name), so re-syncing the
    /// same table definition does not create duplicates.
    pub fn upsert(
        schema_id_val: i64,
        table_name_val: &str,
        column_metadata_val: Option<String>,
    ) -> DbResult<SchemaTable> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            let existing = schema_tables::table
                .filter(
                    schema_tables::dsl::schema_id
                        .eq(schema_id_val)
                        .and(schema_tables::dsl::table_name.eq(table_name_val)),
                )
                .select(SchemaTableDb::as_select())
                .first::<SchemaTableDb>(conn)
                .optional()
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Error looking up table '{}' in schema {}: {}",
                        table_name_val, schema_id_val, e
                    )))
                })?;

            let db_table = match existing {
                // Db-model fields are private outside the generated modules;
                // the Identifiable accessor is the supported way to the key.
                Some(found) => diesel::update(schema_tables::table.find(found.id()))
                    .set((
                        schema_tables::dsl::column_metadata.eq(&column_metadata_val),
                        schema_tables::dsl::updated_at.eq(current_time),
                    ))
                    .returning(SchemaTableDb::as_returning())
                    .get_result::<SchemaTableDb>(conn),
                None => {
                    let new_table = NewSchemaTable {
                        schema_id: schema_id_val,
                        table_name: table_name_val.to_string(),
                        column_metadata: column_metadata_val.clone(),
                        created_at: current_time,
                        updated_at: current_time,
                    };
                    diesel::insert_into(schema_tables::table)
                        .values(NewSchemaTableDb::to_db(&new_table))
                        .returning(SchemaTableDb::as_returning())
                        .get_result::<SchemaTableDb>(conn)
                }
            }
            .map_err(|e| {
                BaseError::DatabaseFatal(Some(format!(
                    "Failed to upsert table '{}': {}",
                    table_name_val, e
                )))
            })?;
            Ok(db_table.from_db())
        })
    }

    pub fn get_by_id(target_id: i64) -> DbResult<SchemaTable> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_table = schema_tables::table
                .find(target_id)
                .select(SchemaTableDb::as_select())
                .first::<SchemaTableDb>(conn)
                .map_err(|e| {
                    if matches!(e, diesel::result::Error::NotFound) {
                        BaseError::NotFound(Some(format!(
                            "Schema table with id {} not found",
                            target_id
                        )))
                    } else {
                        BaseError::DatabaseFatal(Some(format!(
                            "Error fetching schema table {}: {}",
                            target_id, e
                        )))
                    }
                })?;
            Ok(db_table.from_db())
        })
    }

    pub fn list_by_schema(schema_id_val: i64) -> DbResult<Vec<SchemaTable>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_tables = schema_tables::table
                .filter(schema_tables::dsl::schema_id.eq(schema_id_val))
                .order(schema_tables::dsl::table_name.asc())
                .select(SchemaTableDb::as_select())
                .load::<SchemaTableDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to list tables of schema {}: {}",
                        schema_id_val, e
                    )))
                })?;
            Ok(db_tables.into_iter().map(|db_t| db_t.from_db()).collect())
        })
    }

    /// Loads the requested table definitions together with the owner and
    /// dialect of their schemas. Unknown ids are silently absent from the
    /// result.
    pub fn get_many_with_schema(ids: &[i64]) -> DbResult<Vec<(SchemaTable, SchemaOwner)>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let rows = schema_tables::table
                .inner_join(schemas::table)
                .filter(schema_tables::dsl::id.eq_any(ids))
                .select((
                    SchemaTableDb::as_select(),
                    schemas::dsl::id,
                    schemas::dsl::user_id,
                    schemas::dsl::dialect,
                    schemas::dsl::database_name_prefix,
                ))
                .load::<(SchemaTableDb, i64, i64, String, Option<String>)>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to load schema tables {:?}: {}",
                        ids, e
                    )))
                })?;
            Ok(rows
                .into_iter()
                .map(|(t, schema_id, user_id, dialect, database_name_prefix)| {
                    (
                        t.from_db(),
                        SchemaOwner {
                            schema_id,
                            user_id,
                            dialect,
                            database_name_prefix,
                        },
                    )
                })
                .collect())
        })
    }

    pub fn update(target_id: i64, update_data: &UpdateSchemaTableData) -> DbResult<SchemaTable> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            let db_table = diesel::update(schema_tables::table.find(target_id))
                .set((
                    UpdateSchemaTableDataDb::to_db(update_data),
                    schema_tables::dsl::updated_at.eq(current_time),
                ))
                .returning(SchemaTableDb::as_returning())
                .get_result::<SchemaTableDb>(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to update schema table {}: {}",
                        target_id, e
                    )))
                })?;
            Ok(db_table.from_db())
        })
    }

    pub fn delete(target_id: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::delete(schema_tables::table.find(target_id))
                .execute(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to delete schema table {}: {}",
                        target_id, e
                    )))
                })
        })
    }
}
