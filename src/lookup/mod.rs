//! Read paths for push dispatch and biometric verification.
//!
//! Username and device-uuid lookups fail with `NotFound`; an unknown app id is
//! a plain `None`.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::{
    db::DBLayer,
    error::{Error, Result},
    model::device::DeviceRecord,
};

#[derive(Clone)]
pub struct LookupService {
    db: Arc<DBLayer>,
}

impl LookupService {
    pub fn new(db: Arc<DBLayer>) -> Self {
        Self { db }
    }

    /// Push tokens of every device owned by `username`, in registration order.
    pub async fn tokens_by_username(&self, username: &str) -> Result<Vec<String>> {
        let owner = self
            .db
            .find_by_username(username)
            .await?
            .ok_or_else(|| Error::not_found("No device found with this Username"))?;
        Ok(owner.fcm_tokens())
    }

    pub async fn token_by_device_uuid(&self, device_uuid: &str) -> Result<String> {
        self.db
            .find_by_device_uuid(device_uuid)
            .await?
            .and_then(|owner| owner.device(device_uuid).map(|d| d.fcm_token.clone()))
            .ok_or_else(|| Error::not_found("No device found with this Device ID"))
    }

    pub async fn device_by_app_id(&self, app_id: &str) -> Result<Option<DeviceRecord>> {
        self.db.get_by_app_id(app_id).await
    }

    pub async fn devices_by_user_id(&self, user_id: &str) -> Result<Vec<DeviceRecord>> {
        self.db.get_by_user_id(user_id).await
    }

    pub async fn device_by_biometric_secret(&self, secret: &str) -> Result<Option<DeviceRecord>> {
        Ok(self
            .db
            .find_by_biometric_secret(secret)
            .await?
            .map(|(_, device)| device))
    }

    /// True iff `app_id` is registered and its stored secret equals `secret`.
    pub async fn verify_biometric_secret(&self, app_id: &str, secret: &str) -> Result<bool> {
        let Some(device) = self.db.get_by_app_id(app_id).await? else {
            tracing::debug!(app_id = %app_id, "biometric check for unknown app id");
            return Ok(false);
        };

        // Compare digests so the comparison time does not track the common prefix.
        let stored = Sha256::digest(device.biometric_secret.as_bytes());
        let candidate = Sha256::digest(secret.as_bytes());
        Ok(stored == candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::RegistrationService;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        registration: RegistrationService,
        lookup: LookupService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(DBLayer::new(dir.path()).unwrap());
        Fixture {
            _dir: dir,
            registration: RegistrationService::new(db.clone()),
            lookup: LookupService::new(db),
        }
    }

    async fn register(f: &Fixture, device_uuid: &str, secret: &str, token: &str) -> String {
        f.registration
            .register_json(&json!({
                "userId": "u1",
                "deviceUUID": device_uuid,
                "username": "alice",
                "email": "a@x.com",
                "firstName": "A",
                "lastName": "L",
                "biometricSecret": secret,
                "fcmToken": token
            }))
            .await
            .unwrap()
            .app_id
    }

    #[tokio::test]
    async fn tokens_by_username_lists_all_devices() {
        let f = fixture();
        register(&f, "d1", "s1", "t1").await;
        register(&f, "d2", "s2", "t2").await;

        assert_eq!(
            f.lookup.tokens_by_username("alice").await.unwrap(),
            vec!["t1".to_string(), "t2".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_username_fails_but_unknown_app_id_is_absent() {
        let f = fixture();
        register(&f, "d1", "s1", "t1").await;

        assert!(matches!(
            f.lookup.tokens_by_username("bob").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            f.lookup.token_by_device_uuid("d404").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(f.lookup.device_by_app_id("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn token_follows_update_token() {
        let f = fixture();
        register(&f, "d1", "s1", "t1").await;
        register(&f, "d2", "s2", "t3").await;
        assert_eq!(f.lookup.token_by_device_uuid("d1").await.unwrap(), "t1");

        f.registration.update_token("u1", "d1", "t2").await.unwrap();
        assert_eq!(f.lookup.token_by_device_uuid("d1").await.unwrap(), "t2");
        assert_eq!(f.lookup.token_by_device_uuid("d2").await.unwrap(), "t3");
    }

    #[tokio::test]
    async fn device_by_app_id_returns_stored_record() {
        let f = fixture();
        let app_id = register(&f, "d1", "s1", "t1").await;

        let device = f.lookup.device_by_app_id(&app_id).await.unwrap().unwrap();
        assert_eq!(device.device_uuid, "d1");
        assert_eq!(device.biometric_secret, "s1");
        assert_eq!(f.lookup.devices_by_user_id("u1").await.unwrap(), vec![device]);
        assert!(f.lookup.devices_by_user_id("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn biometric_secret_checks_follow_rotation() {
        let f = fixture();
        let app_id = register(&f, "d1", "s1", "t1").await;

        assert!(f.lookup.verify_biometric_secret(&app_id, "s1").await.unwrap());
        assert!(!f.lookup.verify_biometric_secret(&app_id, "s0").await.unwrap());
        assert!(!f.lookup.verify_biometric_secret("unknown", "s1").await.unwrap());

        register(&f, "d1", "s2", "t1").await;
        assert!(!f.lookup.verify_biometric_secret(&app_id, "s1").await.unwrap());
        assert!(f.lookup.verify_biometric_secret(&app_id, "s2").await.unwrap());

        assert!(f.lookup.device_by_biometric_secret("s1").await.unwrap().is_none());
        assert_eq!(
            f.lookup
                .device_by_biometric_secret("s2")
                .await
                .unwrap()
                .unwrap()
                .app_id,
            app_id
        );
    }
}
