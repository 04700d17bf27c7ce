use config::CONFIG;
use controller::{create_router, handle_404};
use service::app_state::{create_app_state, create_state_router};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod controller;
mod database;
mod schema;
mod service;
mod utils;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(CONFIG.log_level.clone())),
        )
        .init();

    let app_state = match create_app_state() {
        Ok(state) => state,
        Err(e) => {
            error!("failed to initialize model backend: {}", e);
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", &CONFIG.host, CONFIG.port);
    info!("server start at {}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    axum::serve(
        listener,
        create_state_router()
            .nest(&CONFIG.base_path, create_router())
            .fallback(handle_404)
            .with_state(app_state)
            .into_make_service(),
    )
    .await
    .expect("failed to start server");
}
