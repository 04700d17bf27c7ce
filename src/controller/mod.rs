use axum::{http, middleware, response::IntoResponse};
use tower_http::cors::CorsLayer;

use crate::service::app_state::{create_state_router, StateRouter};
use crate::utils::auth::authorization_access_middleware;

use auth::{create_auth_router, create_me_router};
use schema::create_schema_router;
use schema_table::create_schema_table_router;
use translate::create_translate_router;

mod auth;
mod error;
mod schema;
mod schema_table;
mod translate;

pub use error::BaseError;

pub fn create_router() -> StateRouter {
    let protected = create_state_router()
        .merge(create_me_router())
        .merge(create_schema_router())
        .merge(create_schema_table_router())
        .merge(create_translate_router())
        .layer(middleware::from_fn(authorization_access_middleware));

    create_state_router()
        .merge(create_auth_router())
        .merge(protected)
        .layer(CorsLayer::permissive())
}

pub async fn handle_404() -> impl IntoResponse {
    (http::StatusCode::NOT_FOUND, "not found")
}
