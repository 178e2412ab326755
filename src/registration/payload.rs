use serde::{
    de::{value::StrDeserializer, IntoDeserializer},
    Deserialize, Deserializer,
};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    model::device::{ApprovalStatus, DeviceUpdate, OwnerProfile},
};

/// Registration body as sent by the app. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub user_id: String,
    #[serde(rename = "deviceUUID")]
    pub device_uuid: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub biometric_secret: String,
    pub fcm_token: String,
    #[serde(default)]
    pub is_primary: Option<bool>,
    #[serde(default, deserialize_with = "approval_status")]
    pub approval_status: Option<ApprovalStatus>,
}

/// Empty string and `null` both mean "not provided".
fn approval_status<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<ApprovalStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => {
            let de: StrDeserializer<'_, D::Error> = raw.as_str().into_deserializer();
            ApprovalStatus::deserialize(de).map(Some)
        }
    }
}

/// A registration payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub user_id: String,
    pub device_uuid: String,
    pub profile: OwnerProfile,
    pub device: DeviceUpdate,
}

impl RegistrationRequest {
    pub fn from_json(value: &Value) -> Result<Self> {
        let payload = RegistrationPayload::deserialize(value)
            .map_err(|e| Error::validation(e.to_string()))?;
        Self::try_from(payload)
    }
}

impl TryFrom<RegistrationPayload> for RegistrationRequest {
    type Error = Error;

    fn try_from(p: RegistrationPayload) -> Result<Self> {
        // These key the store or feed the app id.
        for (field, value) in [
            ("userId", &p.user_id),
            ("deviceUUID", &p.device_uuid),
            ("username", &p.username),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{field} must not be empty")));
            }
        }

        Ok(Self {
            user_id: p.user_id,
            device_uuid: p.device_uuid,
            profile: OwnerProfile {
                email: p.email,
                username: p.username,
                first_name: p.first_name,
                last_name: p.last_name,
            },
            device: DeviceUpdate {
                biometric_secret: p.biometric_secret,
                fcm_token: p.fcm_token,
                approval_status: p.approval_status.unwrap_or_default(),
                is_primary: p.is_primary.unwrap_or(false),
            },
        })
    }
}
