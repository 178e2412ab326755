use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod app_id;
mod config;
mod db;
mod error;
mod internal_api;
mod lookup;
mod model;
mod registration;
mod state;
mod ws;


use config::Config;
use db::DBLayer;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(?config, "starting device registry");

    // -----------------------------
    // Store + index bootstrap
    // -----------------------------
    let db = Arc::new(DBLayer::new(&config.db_path)?);
    db.ensure_indexes().await?;

    let internal_auth = internal_api::auth::load_auth_config(&config.internal_auth_file);
    let state = AppState::new(db, internal_auth);

    // -----------------------------
    // Routers
    // -----------------------------
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "HTTP listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::api_router())
        // Lookups and subscriptions (Basic auth)
        .merge(internal_api::router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
