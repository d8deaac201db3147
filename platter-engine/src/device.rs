//! Anonymous device identity.
//!
//! A device id is created once per client profile and reused for every
//! anonymous request. When the backing store cannot be used the provider
//! falls back to a session-scoped id that is regenerated on every call.

use chrono::Utc;
use platter_core::{DeviceId, EngineResult, StorageError, Timestamp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::persistence::JsonFile;

const USER_AGENT_SLICE: usize = 64;
const FINGERPRINT_HEX_CHARS: usize = 12;

/// Persisted device record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub created_at: Timestamp,
}

/// The device identity handed to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    record: DeviceRecord,
    persisted: bool,
}

impl DeviceIdentity {
    pub fn id(&self) -> &DeviceId {
        &self.record.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.record.created_at
    }

    /// `false` for the degraded session-scoped id.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }
}

/// Where the device record lives.
pub trait DeviceStore: Send + Sync {
    fn load(&self) -> Result<Option<DeviceRecord>, StorageError>;
    fn save(&self, record: &DeviceRecord) -> Result<(), StorageError>;
    fn remove(&self) -> Result<(), StorageError>;
}

/// JSON file in the client state directory.
pub struct FileDeviceStore {
    file: JsonFile<DeviceRecord>,
}

impl FileDeviceStore {
    pub const FILE_NAME: &'static str = "device.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path, "device identity"),
        }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir.into().join(Self::FILE_NAME))
    }
}

impl DeviceStore for FileDeviceStore {
    fn load(&self) -> Result<Option<DeviceRecord>, StorageError> {
        self.file.load()
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), StorageError> {
        self.file.save(record)
    }

    fn remove(&self) -> Result<(), StorageError> {
        self.file.remove()
    }
}

#[derive(Default)]
pub struct MemoryDeviceStore {
    record: Mutex<Option<DeviceRecord>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: DeviceRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn load(&self) -> Result<Option<DeviceRecord>, StorageError> {
        let guard = self.record.lock().map_err(|_| StorageError::poisoned("device store"))?;
        Ok(guard.clone())
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), StorageError> {
        let mut guard = self.record.lock().map_err(|_| StorageError::poisoned("device store"))?;
        *guard = Some(record.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        let mut guard = self.record.lock().map_err(|_| StorageError::poisoned("device store"))?;
        *guard = None;
        Ok(())
    }
}

/// A store that is never available, as in a private-mode client.
pub struct UnavailableDeviceStore;

impl DeviceStore for UnavailableDeviceStore {
    fn load(&self) -> Result<Option<DeviceRecord>, StorageError> {
        Err(unavailable())
    }

    fn save(&self, _record: &DeviceRecord) -> Result<(), StorageError> {
        Err(unavailable())
    }

    fn remove(&self) -> Result<(), StorageError> {
        Err(unavailable())
    }
}

fn unavailable() -> StorageError {
    StorageError::PersistenceFailed {
        what: "device identity".to_string(),
        reason: "storage unavailable".to_string(),
    }
}

/// Coarse client characteristics mixed into new device ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSource {
    pub user_agent: String,
    pub locale: String,
    pub screen: String,
    pub timezone_offset_minutes: i32,
    pub canvas_hash: String,
}

impl Default for FingerprintSource {
    fn default() -> Self {
        Self {
            user_agent: format!("platter/{}", env!("CARGO_PKG_VERSION")),
            locale: "und".to_string(),
            screen: "0x0".to_string(),
            timezone_offset_minutes: 0,
            canvas_hash: String::new(),
        }
    }
}

impl FingerprintSource {
    /// First twelve hex chars of the SHA-256 over the joined inputs.
    pub fn fingerprint(&self) -> String {
        let user_agent: String = self.user_agent.chars().take(USER_AGENT_SLICE).collect();
        let timezone = self.timezone_offset_minutes.to_string();
        let joined = [
            user_agent.as_str(),
            self.locale.as_str(),
            self.screen.as_str(),
            timezone.as_str(),
            self.canvas_hash.as_str(),
        ]
        .join("|");
        let digest = hex::encode(Sha256::digest(joined.as_bytes()));
        digest[..FINGERPRINT_HEX_CHARS].to_string()
    }
}

/// Hands out the device identity, creating it on first use.
pub struct DeviceIdentityProvider {
    store: Arc<dyn DeviceStore>,
    source: FingerprintSource,
    /// Last persisted identity, so the store is read once per process.
    known: Mutex<Option<DeviceIdentity>>,
}

impl DeviceIdentityProvider {
    pub fn new(store: Arc<dyn DeviceStore>, source: FingerprintSource) -> Self {
        Self {
            store,
            source,
            known: Mutex::new(None),
        }
    }

    /// Return the persisted identity, creating and persisting one if none
    /// exists. Never fails: if the store is unusable a fresh session-scoped
    /// id is returned instead.
    pub fn get_or_create(&self) -> DeviceIdentity {
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(identity) = known.as_ref() {
            return identity.clone();
        }
        let identity = self.load_or_create();
        if identity.persisted {
            *known = Some(identity.clone());
        }
        identity
    }

    fn load_or_create(&self) -> DeviceIdentity {
        match self.store.load() {
            Ok(Some(record)) => {
                return DeviceIdentity {
                    record,
                    persisted: true,
                }
            }
            Ok(None) => {}
            Err(StorageError::Corrupt { reason, .. }) => {
                warn!(reason = %reason, "device record unreadable, replacing it");
            }
            Err(err) => {
                warn!(error = %err, "device storage unavailable, using session-scoped id");
                return DeviceIdentity {
                    record: self.generate(),
                    persisted: false,
                };
            }
        }

        let record = self.generate();
        match self.store.save(&record) {
            Ok(()) => {
                info!(device_id = %record.id, "created device identity");
                DeviceIdentity {
                    record,
                    persisted: true,
                }
            }
            Err(err) => {
                warn!(error = %err, "could not persist device identity, using session-scoped id");
                DeviceIdentity {
                    record,
                    persisted: false,
                }
            }
        }
    }

    /// Forget the persisted identity. The next `get_or_create` mints a new one.
    pub fn clear(&self) -> EngineResult<()> {
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        *known = None;
        self.store.remove()?;
        info!("device identity cleared");
        Ok(())
    }

    fn generate(&self) -> DeviceRecord {
        let now = Utc::now();
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let random: u64 = rand::rng().random();
        let id = format!(
            "dev-{}-{}-{}",
            to_base36(millis),
            to_base36(random),
            self.source.fingerprint()
        );
        DeviceRecord {
            id: DeviceId::new(id),
            created_at: now,
        }
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(store: Arc<dyn DeviceStore>) -> DeviceIdentityProvider {
        DeviceIdentityProvider::new(store, FingerprintSource::default())
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
    }

    #[test]
    fn test_id_shape() {
        let device = provider(Arc::new(MemoryDeviceStore::new())).get_or_create();
        let parts: Vec<&str> = device.id().as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "dev");
        assert_eq!(parts[3].len(), FINGERPRINT_HEX_CHARS);
        assert!(device.is_persisted());
    }

    #[test]
    fn test_identity_is_stable_once_persisted() {
        let provider = provider(Arc::new(MemoryDeviceStore::new()));
        let first = provider.get_or_create();
        let second = provider.get_or_create();
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_record_returned() {
        let record = DeviceRecord {
            id: DeviceId::from("dev-123"),
            created_at: Utc::now(),
        };
        let device = provider(Arc::new(MemoryDeviceStore::with_record(record.clone()))).get_or_create();
        assert_eq!(device.record(), &record);
    }

    #[test]
    fn test_unavailable_store_degrades_to_session_ids() {
        let provider = provider(Arc::new(UnavailableDeviceStore));
        let first = provider.get_or_create();
        let second = provider.get_or_create();
        assert!(!first.is_persisted());
        assert_ne!(first.id(), second.id());
        assert!(provider.clear().is_err());
    }

    #[test]
    fn test_clear_mints_new_identity() {
        let provider = provider(Arc::new(MemoryDeviceStore::new()));
        let first = provider.get_or_create();
        provider.clear().unwrap();
        let second = provider.get_or_create();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_file_store_survives_restart_and_replaces_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let first = provider(Arc::new(FileDeviceStore::in_dir(dir.path()))).get_or_create();
        let again = provider(Arc::new(FileDeviceStore::in_dir(dir.path()))).get_or_create();
        assert_eq!(first.id(), again.id());

        std::fs::write(dir.path().join(FileDeviceStore::FILE_NAME), "garbage").unwrap();
        let replaced = provider(Arc::new(FileDeviceStore::in_dir(dir.path()))).get_or_create();
        assert!(replaced.is_persisted());
        assert_ne!(replaced.id(), first.id());
    }

    #[test]
    fn test_fingerprint_truncates_user_agent() {
        let base = FingerprintSource {
            user_agent: "a".repeat(64),
            ..FingerprintSource::default()
        };
        let longer = FingerprintSource {
            user_agent: format!("{}{}", "a".repeat(64), "tail"),
            ..FingerprintSource::default()
        };
        assert_eq!(base.fingerprint(), longer.fingerprint());
        let other = FingerprintSource {
            locale: "fr-FR".to_string(),
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), other.fingerprint());
    }
}
