//! Device registration.
//!
//! ## Flow
//! 1. Validate the payload (no store access on failure)
//! 2. Take the per-user lock
//! 3. Read the owner record and pick create / update-in-place / append
//! 4. Generate an app id for new devices only
//! 5. One compound write

pub mod payload;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{
    app_id::{creation_timestamp, generate_app_id},
    db::DBLayer,
    error::Result,
    model::device::DeviceSlot,
};

pub use payload::RegistrationRequest;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationKind {
    /// First device for a new owner record.
    Created,
    /// Known device re-registered; app id reused.
    Updated,
    /// New device appended to an existing owner.
    Appended,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub app_id: String,
    pub kind: RegistrationKind,
}

#[derive(Clone)]
pub struct RegistrationService {
    db: Arc<DBLayer>,
}

impl RegistrationService {
    pub fn new(db: Arc<DBLayer>) -> Self {
        Self { db }
    }

    pub async fn register_json(&self, payload: &Value) -> Result<RegistrationOutcome> {
        let request = RegistrationRequest::from_json(payload)?;
        self.register(request).await
    }

    pub async fn register(&self, req: RegistrationRequest) -> Result<RegistrationOutcome> {
        let _guard = self.db.lock_user(&req.user_id).await;

        let existing = self.db.find_by_user(&req.user_id).await?;
        let existing_index = existing
            .as_ref()
            .and_then(|owner| owner.device_index(&req.device_uuid));

        tracing::debug!(
            user_id = %req.user_id,
            device_uuid = %req.device_uuid,
            owner_exists = existing.is_some(),
            existing_index = ?existing_index,
            "registration decision"
        );

        let (slot, app_id, kind) = match (existing.as_ref(), existing_index) {
            (Some(owner), Some(index)) => (
                DeviceSlot::Existing(index),
                owner.devices[index].app_id.clone(),
                RegistrationKind::Updated,
            ),
            (owner, _) => {
                let timestamp = creation_timestamp(chrono::Utc::now());
                let app_id =
                    generate_app_id(&req.device_uuid, &req.profile.username, &timestamp)?;
                let kind = if owner.is_some() {
                    RegistrationKind::Appended
                } else {
                    RegistrationKind::Created
                };
                (
                    DeviceSlot::New {
                        app_id: app_id.clone(),
                    },
                    app_id,
                    kind,
                )
            }
        };

        self.db
            .upsert_device(
                &req.user_id,
                &req.device_uuid,
                &slot,
                &req.profile,
                &req.device,
            )
            .await?;

        tracing::info!(
            user_id = %req.user_id,
            device_uuid = %req.device_uuid,
            app_id = %app_id,
            kind = ?kind,
            "device registered"
        );

        Ok(RegistrationOutcome { app_id, kind })
    }

    /// Replace the push token of a registered device.
    pub async fn update_token(
        &self,
        user_id: &str,
        device_uuid: &str,
        fcm_token: &str,
    ) -> Result<()> {
        let _guard = self.db.lock_user(user_id).await;
        self.db.update_token(user_id, device_uuid, fcm_token).await?;

        tracing::info!(user_id = %user_id, device_uuid = %device_uuid, "fcm token updated");
        Ok(())
    }
}
