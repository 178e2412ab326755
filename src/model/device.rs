use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Pending,
    Rejected,
}

impl Default for ApprovalStatus {
    fn default() -> Self {
        ApprovalStatus::Approved
    }
}

/// One app installation on one physical device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(rename = "deviceUUID")]
    pub device_uuid: String,
    pub app_id: String, // never rewritten once assigned
    pub biometric_secret: String,
    pub fcm_token: String,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub is_primary: bool,
    pub last_updated: i64,
}

/// Per-user document aggregating every registered device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOwnerRecord {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    pub created_at: i64,
    pub last_updated: i64,
}

/// Owner-level fields refreshed on every registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerProfile {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Mutable device fields written by a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub biometric_secret: String,
    pub fcm_token: String,
    pub approval_status: ApprovalStatus,
    pub is_primary: bool,
}

/// Where a registration lands in the owner's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSlot {
    /// Update the device at this position; its uuid must still match.
    Existing(usize),
    /// Append a new device carrying a freshly generated app id.
    New { app_id: String },
}

impl DeviceOwnerRecord {
    pub fn new(user_id: &str, profile: &OwnerProfile, now: i64) -> Self {
        let mut owner = Self {
            user_id: user_id.to_string(),
            email: String::new(),
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            devices: Vec::new(),
            created_at: now,
            last_updated: now,
        };
        owner.apply_profile(profile, now);
        owner
    }

    pub fn device_index(&self, device_uuid: &str) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.device_uuid == device_uuid)
    }

    pub fn device(&self, device_uuid: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.device_uuid == device_uuid)
    }

    pub fn device_by_app_id(&self, app_id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.app_id == app_id)
    }

    pub fn fcm_tokens(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.fcm_token.clone()).collect()
    }

    pub fn apply_profile(&mut self, profile: &OwnerProfile, now: i64) {
        self.email = profile.email.clone();
        self.username = profile.username.clone();
        self.first_name = profile.first_name.clone();
        self.last_name = profile.last_name.clone();
        self.last_updated = now;
    }

    /// Write `update` into the device at `index`. The app id is left alone.
    pub fn update_device(&mut self, index: usize, update: &DeviceUpdate, now: i64) -> bool {
        let Some(device) = self.devices.get_mut(index) else {
            return false;
        };
        device.biometric_secret = update.biometric_secret.clone();
        device.fcm_token = update.fcm_token.clone();
        device.approval_status = update.approval_status;
        device.is_primary = update.is_primary;
        device.last_updated = now;
        self.last_updated = now;
        true
    }

    pub fn push_device(
        &mut self,
        device_uuid: &str,
        app_id: &str,
        update: &DeviceUpdate,
        now: i64,
    ) {
        self.devices.push(DeviceRecord {
            device_uuid: device_uuid.to_string(),
            app_id: app_id.to_string(),
            biometric_secret: update.biometric_secret.clone(),
            fcm_token: update.fcm_token.clone(),
            approval_status: update.approval_status,
            is_primary: update.is_primary,
            last_updated: now,
        });
        self.last_updated = now;
    }

    pub fn set_fcm_token(&mut self, device_uuid: &str, fcm_token: &str, now: i64) -> bool {
        let Some(device) = self
            .devices
            .iter_mut()
            .find(|d| d.device_uuid == device_uuid)
        else {
            return false;
        };
        device.fcm_token = fcm_token.to_string();
        device.last_updated = now;
        self.last_updated = now;
        true
    }
}
