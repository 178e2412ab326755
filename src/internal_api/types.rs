use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmTokenResponse {
    #[serde(rename = "deviceUUID")]
    pub device_uuid: String,
    pub fcm_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricVerifyRequest {
    pub app_id: String,
    pub biometric_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BiometricVerifyResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricLookupRequest {
    pub biometric_secret: String,
}
