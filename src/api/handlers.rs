use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;

use crate::{
    api::types::{AckResponse, RegisterResponse, UpdateTokenRequest},
    error::{Error, Result},
    state::AppState,
};

pub async fn register_device(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<RegisterResponse>> {
    let Json(payload) = payload.map_err(|e| Error::validation(e.body_text()))?;
    let outcome = state.registration.register_json(&payload).await?;

    Ok(Json(RegisterResponse {
        app_id: outcome.app_id,
        kind: outcome.kind,
    }))
}

pub async fn update_token(
    State(state): State<AppState>,
    payload: std::result::Result<Json<UpdateTokenRequest>, JsonRejection>,
) -> Result<Json<AckResponse>> {
    let Json(req) = payload.map_err(|e| Error::validation(e.body_text()))?;
    state
        .registration
        .update_token(&req.user_id, &req.device_uuid, &req.fcm_token)
        .await?;

    Ok(Json(AckResponse { ok: true }))
}
