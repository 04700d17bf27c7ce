use axum::{middleware, routing::{get, post}, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::database::user::{NewUser, User, UserInfo};
use crate::schema::enum_def::UserStatus;
use crate::service::app_state::{create_state_router, StateRouter};
use crate::utils::{
    auth::{
        authorization_refresh_middleware, issue_access_token, issue_refresh_token,
        password_digest, AuthUser, RefreshJwtResult,
    },
    HttpResult,
};

use super::error::BaseError;

const DEFAULT_PLAN_ID: i64 = 1;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    refresh_token: String,
    access_token: String,
    user: UserInfo,
}

async fn login(
    Json(login_request): Json<LoginRequest>,
) -> Result<HttpResult<LoginResponse>, BaseError> {
    let user = User::find_by_username(&login_request.username)?
        .ok_or(BaseError::Unauthorized(Some("invalid credentials".to_string())))?;

    if user.password_digest != password_digest(&login_request.password) {
        return Err(BaseError::Unauthorized(Some(
            "invalid credentials".to_string(),
        )));
    }
    if user.status == UserStatus::Suspended {
        return Err(BaseError::Forbidden(Some(
            "account is suspended".to_string(),
        )));
    }

    Ok(HttpResult::new(LoginResponse {
        refresh_token: issue_refresh_token(user.id),
        access_token: issue_access_token(user.id),
        user: user.into(),
    }))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    name: String,
    #[serde(default)]
    company_name: String,
    email: String,
    plan_id: Option<i64>,
}

async fn register(
    Json(register_request): Json<RegisterRequest>,
) -> Result<HttpResult<LoginResponse>, BaseError> {
    if register_request.username.trim().is_empty() || register_request.password.len() < 8 {
        return Err(BaseError::ParamInvalid(Some(
            "username is required and password must be at least 8 characters".to_string(),
        )));
    }

    let current_time = Utc::now().timestamp_millis();
    let new_user = NewUser {
        username: register_request.username.trim().to_string(),
        name: register_request.name,
        company_name: register_request.company_name,
        email: register_request.email,
        password_digest: password_digest(&register_request.password),
        status: UserStatus::Trial,
        plan_id: register_request.plan_id.unwrap_or(DEFAULT_PLAN_ID),
        created_at: current_time,
        updated_at: current_time,
    };
    let user = User::create(&new_user)?;
    Ok(HttpResult::new(LoginResponse {
        refresh_token: issue_refresh_token(user.id),
        access_token: issue_access_token(user.id),
        user: user.into(),
    }))
}

async fn me(Extension(auth): Extension<AuthUser>) -> Result<HttpResult<UserInfo>, BaseError> {
    let user = User::get_by_id(auth.id)?;
    Ok(HttpResult::new(user.into()))
}

async fn refresh_token(
    Extension(jwt_result): Extension<RefreshJwtResult>,
) -> Result<HttpResult<String>, BaseError> {
    Ok(HttpResult::new(issue_access_token(jwt_result.id)))
}

pub fn create_auth_router() -> StateRouter {
    let refresh_token_router = create_state_router()
        .route("/refresh_token", post(refresh_token))
        .layer(middleware::from_fn(authorization_refresh_middleware));

    create_state_router().nest(
        "/auth",
        create_state_router()
            .route("/login", post(login))
            .route("/register", post(register))
            .merge(refresh_token_router),
    )
}

/// Routes that need a valid access token; mounted behind the access
/// middleware by the caller.
pub fn create_me_router() -> StateRouter {
    create_state_router().route("/auth/me", get(me))
}
