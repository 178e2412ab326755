use std::{path::Path, str};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, OwnedMutexGuard};

use crate::{
    error::{Error, Result},
    model::device::{DeviceOwnerRecord, DeviceRecord, DeviceSlot, DeviceUpdate, OwnerProfile},
};

pub mod locks;

use locks::UserLocks;

const OWNER_PREFIX: &str = "device_owner:";
const INDEX_PREFIX: &str = "idx:";
const INDEX_BUILT_FLAG: &str = "idx:built";
const IDX_USERNAME: &str = "idx:username:";
const IDX_DEVICE: &str = "idx:device:";
const IDX_APP: &str = "idx:app:";
const IDX_SECRET: &str = "idx:secret:";
// Separates the looked-up value from the owning user id inside index keys.
const KEY_SEP: char = '\u{1f}';

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Embedded document store for device owner records.
///
/// One JSON document per user id plus secondary index keys pointing back
/// at the owning user id. Every write goes out as a single `WriteBatch`.
pub struct DBLayer {
    db: DB,
    locks: UserLocks,
    changes: broadcast::Sender<DeviceOwnerRecord>,
}

impl DBLayer {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            db,
            locks: UserLocks::new(),
            changes,
        })
    }

    /// Serialise read-decide-write sequences for one user.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(user_id).await
    }

    /// Committed owner snapshots, one per write.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceOwnerRecord> {
        self.changes.subscribe()
    }

    // ============================================================
    // KEYS
    // ============================================================
    fn owner_key(user_id: &str) -> String {
        format!("{OWNER_PREFIX}{user_id}")
    }

    fn index_prefix(kind: &str, value: &str) -> String {
        format!("{kind}{value}{KEY_SEP}")
    }

    fn index_key(kind: &str, value: &str, user_id: &str) -> String {
        format!("{}{user_id}", Self::index_prefix(kind, value))
    }

    fn index_keys(owner: &DeviceOwnerRecord) -> Vec<String> {
        let uid = &owner.user_id;
        let mut keys = vec![Self::index_key(IDX_USERNAME, &owner.username, uid)];
        for device in &owner.devices {
            keys.push(Self::index_key(IDX_DEVICE, &device.device_uuid, uid));
            keys.push(Self::index_key(IDX_APP, &device.app_id, uid));
            keys.push(Self::index_key(
                IDX_SECRET,
                &secret_digest(&device.biometric_secret),
                uid,
            ));
        }
        keys
    }

    // ============================================================
    // INDEX BOOTSTRAP
    // ============================================================

    /// Build secondary indexes if they were never completed.
    pub async fn ensure_indexes(&self) -> Result<()> {
        if self.db.get(INDEX_BUILT_FLAG)?.is_some() {
            return Ok(());
        }
        self.rebuild_indexes().await
    }

    pub async fn rebuild_indexes(&self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for key in self.keys_with_prefix(INDEX_PREFIX)? {
            batch.delete(key);
        }

        let owners = self.list_owners().await?;
        for owner in &owners {
            for key in Self::index_keys(owner) {
                batch.put(key, owner.user_id.as_bytes());
            }
        }
        batch.put(INDEX_BUILT_FLAG, b"1");
        self.db.write(batch)?;

        tracing::info!(owners = owners.len(), "device indexes rebuilt");
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<Box<[u8]>>> {
        let mut keys = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// User ids recorded under one index value, in key order.
    fn index_lookup(&self, kind: &str, value: &str) -> Result<Vec<String>> {
        let prefix = Self::index_prefix(kind, value);
        let mut user_ids = Vec::new();

        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, val) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let user_id = str::from_utf8(&val)
                .map_err(|e| Error::Corrupt(format!("index value under {prefix:?}: {e}")))?;
            user_ids.push(user_id.to_string());
        }

        Ok(user_ids)
    }

    // ============================================================
    // OWNER READS
    // ============================================================
    pub async fn find_by_user(&self, user_id: &str) -> Result<Option<DeviceOwnerRecord>> {
        self.db
            .get(Self::owner_key(user_id))?
            .map(|v| serde_json::from_slice(&v).map_err(Error::from))
            .transpose()
    }

    pub async fn list_owners(&self) -> Result<Vec<DeviceOwnerRecord>> {
        let mut results = Vec::new();

        for item in self.db.iterator(IteratorMode::From(
            OWNER_PREFIX.as_bytes(),
            Direction::Forward,
        )) {
            let (key, val) = item?;
            if !key.starts_with(OWNER_PREFIX.as_bytes()) {
                break;
            }
            results.push(serde_json::from_slice(&val)?);
        }

        Ok(results)
    }

    /// First owner whose index entry and document both agree on `pred`.
    async fn find_indexed(
        &self,
        kind: &str,
        value: &str,
        pred: impl Fn(&DeviceOwnerRecord) -> bool,
    ) -> Result<Option<DeviceOwnerRecord>> {
        for user_id in self.index_lookup(kind, value)? {
            match self.find_by_user(&user_id).await? {
                Some(owner) if pred(&owner) => return Ok(Some(owner)),
                Some(_) => {
                    tracing::warn!(user_id = %user_id, kind, "stale index entry");
                }
                None => {
                    return Err(Error::Corrupt(format!(
                        "index {kind} points at missing owner {user_id}"
                    )));
                }
            }
        }
        Ok(None)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<DeviceOwnerRecord>> {
        self.find_indexed(IDX_USERNAME, username, |o| o.username == username)
            .await
    }

    pub async fn find_by_device_uuid(
        &self,
        device_uuid: &str,
    ) -> Result<Option<DeviceOwnerRecord>> {
        self.find_indexed(IDX_DEVICE, device_uuid, |o| o.device(device_uuid).is_some())
            .await
    }

    // ============================================================
    // DEVICE READS
    // ============================================================
    pub async fn get_by_app_id(&self, app_id: &str) -> Result<Option<DeviceRecord>> {
        let owner = self
            .find_indexed(IDX_APP, app_id, |o| o.device_by_app_id(app_id).is_some())
            .await?;
        Ok(owner.and_then(|o| o.device_by_app_id(app_id).cloned()))
    }

    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Vec<DeviceRecord>> {
        Ok(self
            .find_by_user(user_id)
            .await?
            .map(|o| o.devices)
            .unwrap_or_default())
    }

    pub async fn find_by_biometric_secret(
        &self,
        secret: &str,
    ) -> Result<Option<(String, DeviceRecord)>> {
        let owner = self
            .find_indexed(IDX_SECRET, &secret_digest(secret), |o| {
                o.devices.iter().any(|d| d.biometric_secret == secret)
            })
            .await?;

        Ok(owner.and_then(|o| {
            o.devices
                .iter()
                .find(|d| d.biometric_secret == secret)
                .cloned()
                .map(|d| (o.user_id.clone(), d))
        }))
    }

    // ============================================================
    // WRITES
    // ============================================================

    /// Create the owner, update a device in place, or append one, together
    /// with the owner profile, as one atomic write.
    ///
    /// Callers must hold [`DBLayer::lock_user`] for `user_id` across the read
    /// that produced `slot` and this call.
    pub async fn upsert_device(
        &self,
        user_id: &str,
        device_uuid: &str,
        slot: &DeviceSlot,
        profile: &OwnerProfile,
        update: &DeviceUpdate,
    ) -> Result<DeviceOwnerRecord> {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.find_by_user(user_id).await?;

        let owner = match (previous.clone(), slot) {
            (None, DeviceSlot::New { app_id }) => {
                let mut owner = DeviceOwnerRecord::new(user_id, profile, now);
                owner.push_device(device_uuid, app_id, update, now);
                owner
            }
            (None, DeviceSlot::Existing(index)) => {
                return Err(Error::Conflict(format!(
                    "owner {user_id} vanished before updating device at {index}"
                )));
            }
            (Some(mut owner), DeviceSlot::Existing(index)) => {
                let matches = owner
                    .devices
                    .get(*index)
                    .map(|d| d.device_uuid == device_uuid)
                    .unwrap_or(false);
                if !matches {
                    return Err(Error::Conflict(format!(
                        "device list of {user_id} changed; position {index} no longer holds {device_uuid}"
                    )));
                }
                owner.apply_profile(profile, now);
                owner.update_device(*index, update, now);
                owner
            }
            (Some(mut owner), DeviceSlot::New { app_id }) => {
                if owner.device_index(device_uuid).is_some() {
                    return Err(Error::Conflict(format!(
                        "device {device_uuid} already registered for {user_id}"
                    )));
                }
                owner.apply_profile(profile, now);
                owner.push_device(device_uuid, app_id, update, now);
                owner
            }
        };

        self.write_owner(previous.as_ref(), &owner)?;
        Ok(owner)
    }

    /// Replace only the push token of one device.
    pub async fn update_token(
        &self,
        user_id: &str,
        device_uuid: &str,
        fcm_token: &str,
    ) -> Result<DeviceOwnerRecord> {
        let not_found = || {
            Error::not_found(format!(
                "No device {device_uuid} registered for user {user_id}"
            ))
        };

        let previous = self.find_by_user(user_id).await?.ok_or_else(not_found)?;
        let mut owner = previous.clone();
        let now = chrono::Utc::now().timestamp_millis();
        if !owner.set_fcm_token(device_uuid, fcm_token, now) {
            return Err(not_found());
        }

        self.write_owner(Some(&previous), &owner)?;
        Ok(owner)
    }

    fn write_owner(
        &self,
        previous: Option<&DeviceOwnerRecord>,
        owner: &DeviceOwnerRecord,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        if let Some(previous) = previous {
            for key in Self::index_keys(previous) {
                batch.delete(key);
            }
        }
        for key in Self::index_keys(owner) {
            batch.put(key, owner.user_id.as_bytes());
        }
        batch.put(Self::owner_key(&owner.user_id), serde_json::to_vec(owner)?);
        self.db.write(batch)?;

        // No subscribers is not a failure.
        let _ = self.changes.send(owner.clone());
        Ok(())
    }
}

/// Hex SHA-256 of a biometric secret; the index never holds the secret itself.
fn secret_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::ApprovalStatus;
    use tempfile::TempDir;

    fn open() -> (TempDir, DBLayer) {
        let dir = TempDir::new().unwrap();
        let db = DBLayer::new(dir.path()).unwrap();
        (dir, db)
    }

    fn profile(username: &str) -> OwnerProfile {
        OwnerProfile {
            email: format!("{username}@x.com"),
            username: username.into(),
            first_name: "A".into(),
            last_name: "L".into(),
        }
    }

    fn update(secret: &str, token: &str) -> DeviceUpdate {
        DeviceUpdate {
            biometric_secret: secret.into(),
            fcm_token: token.into(),
            approval_status: ApprovalStatus::Approved,
            is_primary: false,
        }
    }

    fn new_slot(app_id: &str) -> DeviceSlot {
        DeviceSlot::New {
            app_id: app_id.into(),
        }
    }

    #[tokio::test]
    async fn creates_owner_and_indexes_device() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();

        let owner = db.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(owner.devices.len(), 1);
        assert_eq!(owner.created_at, owner.last_updated);

        assert_eq!(
            db.find_by_username("alice").await.unwrap().unwrap().user_id,
            "u1"
        );
        assert_eq!(
            db.find_by_device_uuid("d1").await.unwrap().unwrap().user_id,
            "u1"
        );
        assert_eq!(db.get_by_app_id("app1").await.unwrap().unwrap().device_uuid, "d1");
        let (uid, device) = db.find_by_biometric_secret("s1").await.unwrap().unwrap();
        assert_eq!(uid, "u1");
        assert_eq!(device.app_id, "app1");
    }

    #[tokio::test]
    async fn existing_slot_guard_rejects_shifted_index() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();

        let err = db
            .upsert_device(
                "u1",
                "d2",
                &DeviceSlot::Existing(0),
                &profile("alice"),
                &update("s2", "t2"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = db
            .upsert_device("u1", "d1", &new_slot("app9"), &profile("alice"), &update("s", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(db.get_by_user_id("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rotating_secret_moves_secret_index() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();
        db.upsert_device(
            "u1",
            "d1",
            &DeviceSlot::Existing(0),
            &profile("alice"),
            &update("s2", "t1"),
        )
        .await
        .unwrap();

        assert!(db.find_by_biometric_secret("s1").await.unwrap().is_none());
        assert!(db.find_by_biometric_secret("s2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn username_change_moves_username_index() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();
        db.upsert_device(
            "u1",
            "d1",
            &DeviceSlot::Existing(0),
            &profile("alicia"),
            &update("s1", "t1"),
        )
        .await
        .unwrap();

        assert!(db.find_by_username("alice").await.unwrap().is_none());
        assert!(db.find_by_username("alicia").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shared_username_resolves_each_owner_independently() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("sam"), &update("s1", "t1"))
            .await
            .unwrap();
        db.upsert_device("u2", "d2", &new_slot("app2"), &profile("sam"), &update("s2", "t2"))
            .await
            .unwrap();
        db.upsert_device(
            "u1",
            "d1",
            &DeviceSlot::Existing(0),
            &profile("samuel"),
            &update("s1", "t1"),
        )
        .await
        .unwrap();

        assert_eq!(db.find_by_username("sam").await.unwrap().unwrap().user_id, "u2");
    }

    #[tokio::test]
    async fn update_token_missing_pair_is_not_found_and_writes_nothing() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();
        let before = db.find_by_user("u1").await.unwrap().unwrap();

        assert!(matches!(
            db.update_token("u1", "ghost", "t9").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.update_token("nobody", "d1", "t9").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(db.find_by_user("u1").await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn update_token_touches_only_token_and_timestamps() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();

        let owner = db.update_token("u1", "d1", "t2").await.unwrap();
        let device = &owner.devices[0];
        assert_eq!(device.fcm_token, "t2");
        assert_eq!(device.biometric_secret, "s1");
        assert_eq!(device.app_id, "app1");
        assert_eq!(device.last_updated, owner.last_updated);
    }

    #[tokio::test]
    async fn get_by_user_id_of_unknown_user_is_empty() {
        let (_dir, db) = open();
        assert!(db.get_by_user_id("nobody").await.unwrap().is_empty());
        assert!(db.get_by_app_id("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rebuild_restores_dropped_indexes() {
        let (_dir, db) = open();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();

        let mut batch = WriteBatch::default();
        for key in db.keys_with_prefix(INDEX_PREFIX).unwrap() {
            batch.delete(key);
        }
        db.db.write(batch).unwrap();
        assert!(db.get_by_app_id("app1").await.unwrap().is_none());

        db.ensure_indexes().await.unwrap();
        assert!(db.get_by_app_id("app1").await.unwrap().is_some());
        assert!(db.find_by_username("alice").await.unwrap().is_some());

        // Flag set: second call is a no-op.
        db.ensure_indexes().await.unwrap();
    }

    #[tokio::test]
    async fn writes_are_broadcast() {
        let (_dir, db) = open();
        let mut rx = db.subscribe();
        db.upsert_device("u1", "d1", &new_slot("app1"), &profile("alice"), &update("s1", "t1"))
            .await
            .unwrap();
        db.update_token("u1", "d1", "t2").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().devices[0].fcm_token, "t1");
        assert_eq!(rx.recv().await.unwrap().devices[0].fcm_token, "t2");
    }
}
