//! DocBridge development provider.
//!
//! A small Axum server exposing the session and document endpoints the
//! DocBridge client speaks to. Useful for local runs and demos.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use docbridge_shared::{DISCOVERY_PATH, DOCUMENTS_PATH, SESSION_PATH};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod middleware;
mod problem;
mod routes;
mod state;
mod tokens;

use config::ServerConfig;
use state::AppState;

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Discovery
        .route(DISCOVERY_PATH, get(routes::discovery::provider_document))
        // Session
        .route(
            SESSION_PATH,
            post(routes::session::create_session)
                .get(routes::session::session_status)
                .delete(routes::session::delete_session),
        )
        // Documents
        .route(
            DOCUMENTS_PATH,
            get(routes::documents::list_documents).post(routes::documents::create_document),
        )
        .route(
            &format!("{DOCUMENTS_PATH}/{{document_id}}/content"),
            get(routes::documents::document_content),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docbridge_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let db = db::init_database(&config.db_path)?;
    if let Some(seed) = &config.seed_client {
        db::seed_client(&db, seed).await?;
    }

    let addr = config.bind;
    let app = router(AppState::new(db, config));

    tracing::info!("Starting provider on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
