use serde::{Deserialize, Serialize};

use crate::registration::RegistrationKind;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub app_id: String,
    pub kind: RegistrationKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenRequest {
    pub user_id: String,
    #[serde(rename = "deviceUUID")]
    pub device_uuid: String,
    pub fcm_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}
