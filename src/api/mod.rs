use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

pub mod handlers;
pub mod types;

use handlers::{register_device, update_token};

/// Client-facing routes used by the registration flow.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/device-details", post(register_device))
        .route("/api/device-details/token", post(update_token))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
