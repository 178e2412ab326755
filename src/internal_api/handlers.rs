use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use crate::{
    error::{Error, Result},
    internal_api::types::{
        BiometricLookupRequest, BiometricVerifyRequest, BiometricVerifyResponse, FcmTokenResponse,
    },
    model::device::DeviceRecord,
    state::AppState,
};

pub async fn fcm_tokens_by_username(
    Path(username): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.lookup.tokens_by_username(&username).await?))
}

pub async fn fcm_token_by_device(
    Path(device_uuid): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FcmTokenResponse>> {
    let fcm_token = state.lookup.token_by_device_uuid(&device_uuid).await?;
    Ok(Json(FcmTokenResponse {
        device_uuid,
        fcm_token,
    }))
}

/// Answers JSON `null` for an unknown app id.
pub async fn device_by_app_id(
    Path(app_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Option<DeviceRecord>>> {
    Ok(Json(state.lookup.device_by_app_id(&app_id).await?))
}

pub async fn devices_by_user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceRecord>>> {
    Ok(Json(state.lookup.devices_by_user_id(&user_id).await?))
}

pub async fn verify_biometric(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BiometricVerifyRequest>, JsonRejection>,
) -> Result<Json<BiometricVerifyResponse>> {
    let Json(req) = payload.map_err(|e| Error::validation(e.body_text()))?;
    let valid = state
        .lookup
        .verify_biometric_secret(&req.app_id, &req.biometric_secret)
        .await?;

    if !valid {
        tracing::warn!(app_id = %req.app_id, "biometric secret rejected");
    }
    Ok(Json(BiometricVerifyResponse { valid }))
}

/// Device currently holding `biometricSecret`; JSON `null` when none does.
pub async fn device_by_biometric_secret(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BiometricLookupRequest>, JsonRejection>,
) -> Result<Json<Option<DeviceRecord>>> {
    let Json(req) = payload.map_err(|e| Error::validation(e.body_text()))?;
    Ok(Json(
        state
            .lookup
            .device_by_biometric_secret(&req.biometric_secret)
            .await?,
    ))
}
