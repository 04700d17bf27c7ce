use diesel::prelude::*;

use crate::controller::BaseError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = plans)]
    pub struct Plan {
        pub id: i64,
        pub name: String,
        pub monthly_request_limit: i64,
        pub monthly_token_limit: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

impl Plan {
    pub fn get_by_id(target_id: i64) -> DbResult<Plan> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_plan = plans::table
                .find(target_id)
                .select(PlanDb::as_select())
                .first::<PlanDb>(conn)
                .map_err(|e| {
                    if matches!(e, diesel::result::Error::NotFound) {
                        BaseError::NotFound(Some(format!("Plan with id {} not found", target_id)))
                    } else {
                        BaseError::DatabaseFatal(Some(format!(
                            "Error fetching plan {}: {}",
                            target_id, e
                        )))
                    }
                })?;
            Ok(db_plan.from_db())
        })
    }
}
