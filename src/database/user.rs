use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::controller::BaseError;
use crate::database::{get_connection, DbResult};
use crate::schema::enum_def::UserStatus;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = users)]
    pub struct User {
        pub id: i64,
        pub username: String,
        pub name: String,
        pub company_name: String,
        pub email: String,
        pub password_digest: String,
        pub status: UserStatus,
        pub plan_id: i64,
        pub monthly_requests_count: i64,
        pub monthly_token_count: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Insertable, Deserialize, Debug)]
    #[diesel(table_name = users)]
    pub struct NewUser {
        pub username: String,
        pub name: String,
        pub company_name: String,
        pub email: String,
        pub password_digest: String,
        pub status: UserStatus,
        pub plan_id: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }
}

/// Public view of a user, stripped of the password digest.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub status: UserStatus,
    pub plan_id: i64,
    pub monthly_requests_count: i64,
    pub monthly_token_count: i64,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        UserInfo {
            id: user.id,
            username: user.username,
            name: user.name,
            company_name: user.company_name,
            email: user.email,
            status: user.status,
            plan_id: user.plan_id,
            monthly_requests_count: user.monthly_requests_count,
            monthly_token_count: user.monthly_token_count,
        }
    }
}

impl User {
    pub fn create(new_user: &NewUser) -> DbResult<User> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_user = diesel::insert_into(users::table)
                .values(NewUserDb::to_db(new_user))
                .returning(UserDb::as_returning())
                .get_result::<UserDb>(conn)
                .map_err(|e| match e {
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => BaseError::DatabaseDup(Some(
                        "username or email is already registered".to_string(),
                    )),
                    other => BaseError::DatabaseFatal(Some(format!(
                        "Failed to insert user: {}",
                        other
                    ))),
                })?;
            Ok(db_user.from_db())
        })
    }

    pub fn get_by_id(target_id: i64) -> DbResult<User> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_user = users::table
                .find(target_id)
                .select(UserDb::as_select())
                .first::<UserDb>(conn)
                .map_err(|e| {
                    if matches!(e, diesel::result::Error::NotFound) {
                        BaseError::NotFound(Some(format!("User with id {} not found", target_id)))
                    } else {
                        BaseError::DatabaseFatal(Some(format!(
                            "Error fetching user {}: {}",
                            target_id, e
                        )))
                    }
                })?;
            Ok(db_user.from_db())
        })
    }

    pub fn find_by_username(username_val: &str) -> DbResult<Option<User>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_user_opt = users::table
                .filter(users::dsl::username.eq(username_val))
                .select(UserDb::as_select())
                .first::<UserDb>(conn)
                .optional()
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Error fetching user '{}': {}",
                        username_val, e
                    )))
                })?;
            Ok(db_user_opt.map(|db_u| db_u.from_db()))
        })
    }

    /// Applies one model call to the user's monthly counters.
    ///
    /// The increment runs as a single UPDATE so that concurrent requests from
    /// the same user cannot lose updates; the counters are never read back
    /// into application code first.
    pub fn charge_usage(user_id: i64, total_tokens: i64) -> DbResult<()> {
        let conn = &mut get_connection();
        let current_time = chrono::Utc::now().timestamp_millis();
        db_execute!(conn, {
            let affected = diesel::update(users::table.find(user_id))
                .set((
                    users::dsl::monthly_requests_count
                        .eq(users::dsl::monthly_requests_count + 1),
                    users::dsl::monthly_token_count
                        .eq(users::dsl::monthly_token_count + total_tokens),
                    users::dsl::updated_at.eq(current_time),
                ))
                .execute(conn)
                .map_err(|e| {
                    BaseError::DatabaseFatal(Some(format!(
                        "Failed to charge usage for user {}: {}",
                        user_id, e
                    )))
                })?;
            if affected == 0 {
                return Err(BaseError::NotFound(Some(format!(
                    "User with id {} not found",
                    user_id
                ))));
            }
            Ok(())
        })
    }
}
