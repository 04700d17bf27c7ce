use std::fmt;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use reqwest::StatusCode;
use serde_json::json;

use crate::service::translate::TranslateError;

#[derive(Debug)]
pub enum BaseError {
    ParamInvalid(Option<String>),
    NotFound(Option<String>),
    Unauthorized(Option<String>),
    Forbidden(Option<String>),
    UsageLimitExceeded(Option<String>),
    DatabaseFatal(Option<String>),
    DatabaseDup(Option<String>),
    LlmUnavailable(Option<String>),
    SqlRejected(Option<String>),
    InternalServerError(Option<String>),
}

impl fmt::Display for BaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (default_msg, msg) = match self {
            BaseError::ParamInvalid(msg) => ("request params invalid", msg),
            BaseError::NotFound(msg) => ("data not found", msg),
            BaseError::Unauthorized(msg) => ("Unauthorized", msg),
            BaseError::Forbidden(msg) => ("forbidden", msg),
            BaseError::UsageLimitExceeded(msg) => ("monthly usage limit reached", msg),
            BaseError::DatabaseFatal(msg) => ("database unknown error", msg),
            BaseError::DatabaseDup(msg) => ("some unique keys have conflicted", msg),
            BaseError::LlmUnavailable(msg) => ("model backend unavailable", msg),
            BaseError::SqlRejected(msg) => ("generated SQL was rejected", msg),
            BaseError::InternalServerError(msg) => ("internal server error", msg),
        };
        f.write_str(msg.as_deref().unwrap_or(default_msg))
    }
}

impl std::error::Error for BaseError {}

impl From<diesel::result::Error> for BaseError {
    fn from(err: diesel::result::Error) -> Self {
        BaseError::DatabaseFatal(Some(err.to_string()))
    }
}

impl From<TranslateError> for BaseError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::InvalidRequest(msg) => BaseError::ParamInvalid(Some(msg)),
            TranslateError::NotFound => {
                BaseError::NotFound(Some("requested tables do not exist".to_string()))
            }
            TranslateError::Forbidden => {
                BaseError::Forbidden(Some("requested tables are not accessible".to_string()))
            }
            TranslateError::Model(e) => BaseError::LlmUnavailable(Some(e.to_string())),
            TranslateError::Malformed => BaseError::LlmUnavailable(Some(
                "model response could not be interpreted".to_string(),
            )),
            TranslateError::Rejected(msg) => BaseError::SqlRejected(Some(msg)),
            // Details were already logged where the failure happened.
            TranslateError::Internal => BaseError::InternalServerError(None),
        }
    }
}

impl IntoResponse for BaseError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message) = match self {
            BaseError::ParamInvalid(msg) => (
                StatusCode::BAD_REQUEST,
                1001,
                msg.unwrap_or("request params invalid".to_string()),
            ),
            BaseError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                1002,
                msg.unwrap_or("data not found".to_string()),
            ),
            BaseError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                1003,
                msg.unwrap_or("Unauthorized".to_string()),
            ),
            BaseError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                1004,
                msg.unwrap_or("forbidden".to_string()),
            ),
            BaseError::UsageLimitExceeded(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                1005,
                msg.unwrap_or("monthly usage limit reached".to_string()),
            ),
            BaseError::DatabaseFatal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                1100,
                msg.unwrap_or("database unknown error".to_string()),
            ),
            BaseError::DatabaseDup(msg) => (
                StatusCode::BAD_REQUEST,
                1101,
                msg.unwrap_or("some unique keys have conflicted".to_string()),
            ),
            BaseError::LlmUnavailable(msg) => (
                StatusCode::BAD_GATEWAY,
                1300,
                msg.unwrap_or("model backend unavailable".to_string()),
            ),
            BaseError::SqlRejected(msg) => (
                StatusCode::BAD_REQUEST,
                1301,
                msg.unwrap_or("generated SQL was rejected".to_string()),
            ),
            BaseError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                0,
                msg.unwrap_or("internal server error".to_string()),
            ),
        };
        let body = Json(json!({
            "code": error_code,
            "msg": error_message,
        }));
        (status, body).into_response()
    }
}
