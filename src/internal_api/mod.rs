use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{state::AppState, ws};

pub mod auth;
pub mod handlers;
pub mod types;

use auth::require_internal_auth;
use handlers::{
    device_by_app_id, device_by_biometric_secret, devices_by_user, fcm_token_by_device,
    fcm_tokens_by_username, verify_biometric,
};

/// Service-to-service lookups and subscriptions (Basic auth).
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/internal/device-details/fcm-tokens/by-username/{username}",
            get(fcm_tokens_by_username),
        )
        .route(
            "/internal/device-details/fcm-token/by-device/{device_uuid}",
            get(fcm_token_by_device),
        )
        .route(
            "/internal/device-details/by-app-id/{app_id}",
            get(device_by_app_id),
        )
        .route("/internal/device-details/by-user/{user_id}", get(devices_by_user))
        .route(
            "/internal/device-details/biometric/verify",
            post(verify_biometric),
        )
        .route(
            "/internal/device-details/biometric/lookup",
            post(device_by_biometric_secret),
        )
        .merge(ws::subscription_router())
        .route_layer(middleware::from_fn_with_state(state, require_internal_auth))
}
