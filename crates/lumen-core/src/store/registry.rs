// ── Device registry ──
//
// The single source of truth for known devices. Records are keyed by
// `HardwareId`; addresses and names are mutable attributes. Mutations
// commit atomically per record and every committed mutation publishes
// a fresh, identity-ordered snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::collection::EntityCollection;
use crate::error::CoreError;
use crate::model::{Device, HardwareId};
use crate::stream::DeviceStream;

// ── Persistence backends ─────────────────────────────────────────────

/// Where registry records live between runs.
pub trait RegistryBackend: Send + Sync {
    fn load(&self) -> Result<Vec<Device>, CoreError>;
    fn save(&self, devices: &[Arc<Device>]) -> Result<(), CoreError>;
}

/// Keeps nothing. Used by tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl RegistryBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<Device>, CoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _devices: &[Arc<Device>]) -> Result<(), CoreError> {
        Ok(())
    }
}

const FILE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct RegistryFile<D> {
    version: u32,
    devices: Vec<D>,
}

/// A single JSON document, rewritten on every committed change.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failure(&self, message: impl ToString) -> CoreError {
        CoreError::Persistence {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl RegistryBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<Device>, CoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.failure(e))?;
        let file: RegistryFile<Device> =
            serde_json::from_str(&raw).map_err(|e| self.failure(e))?;
        if file.version != FILE_FORMAT_VERSION {
            return Err(self.failure(format!(
                "unsupported registry format version {}",
                file.version
            )));
        }
        Ok(file.devices)
    }

    fn save(&self, devices: &[Arc<Device>]) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.failure(e))?;
        }
        let file = RegistryFile {
            version: FILE_FORMAT_VERSION,
            devices: devices.iter().map(AsRef::as_ref).collect::<Vec<&Device>>(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| self.failure(e))?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json).map_err(|e| self.failure(e))?;
        std::fs::rename(&staging, &self.path).map_err(|e| self.failure(e))
    }
}

// ── DeviceRegistry ───────────────────────────────────────────────────

pub struct DeviceRegistry {
    devices: EntityCollection<HardwareId, Device>,
    /// Per-identity locks for multi-step read-decide-write sequences.
    identity_locks: DashMap<HardwareId, Arc<tokio::sync::Mutex<()>>>,
    backend: Arc<dyn RegistryBackend>,
    persist_lock: Arc<Mutex<()>>,
    /// Saves handed to the blocking pool and not yet awaited.
    pending_saves: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceRegistry {
    /// A registry that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend))
    }

    /// Open a registry backed by a JSON file, loading existing records.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Self::open(Box::new(JsonFileBackend::new(path)))
    }

    /// Open a registry over any backend, loading existing records.
    pub fn open(backend: Box<dyn RegistryBackend>) -> Result<Self, CoreError> {
        let loaded = backend.load()?;
        let registry = Self::with_backend(backend);

        let mut skipped = 0usize;
        let entries: Vec<(HardwareId, Device)> = loaded
            .into_iter()
            .filter(|d| {
                let keep = !d.identity.is_empty();
                skipped += usize::from(!keep);
                keep
            })
            .map(|d| (d.identity.clone(), d))
            .collect();
        if skipped > 0 {
            warn!(skipped, "Ignoring stored devices without a hardware identity");
        }
        registry.devices.replace_all(entries);
        info!(devices = registry.devices.len(), "Device registry loaded");
        Ok(registry)
    }

    fn with_backend(backend: Box<dyn RegistryBackend>) -> Self {
        Self {
            devices: EntityCollection::new(),
            identity_locks: DashMap::new(),
            backend: Arc::from(backend),
            persist_lock: Arc::new(Mutex::new(())),
            pending_saves: Mutex::new(Vec::new()),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn find(&self, identity: &HardwareId) -> Option<Device> {
        self.devices.get(identity).map(|d| (*d).clone())
    }

    /// Identity-ordered snapshot of every record.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    /// Subscribe to committed changes.
    pub fn changes(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert `device`, or merge it into the existing record with the same
    /// identity (last writer wins per field). Identical writes publish
    /// nothing.
    pub fn upsert(&self, device: Device) -> Result<Device, CoreError> {
        if device.identity.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "device record has no hardware identity".into(),
            });
        }
        let identity = device.identity.clone();

        let committed = self.devices.upsert_with(identity.clone(), |current| match current {
            Some(current) => {
                let mut merged = current.clone();
                merged.merge_from(device);
                (merged != *current).then_some(merged)
            }
            None => Some(device),
        });

        match committed {
            Some(saved) => {
                debug!(identity = %identity, address = %saved.address, "Device record committed");
                self.persist();
                Ok((*saved).clone())
            }
            None => self.find(&identity).ok_or(CoreError::DeviceNotFound {
                identifier: identity.to_string(),
            }),
        }
    }

    /// Apply `change` to the record for `identity`, if it exists.
    ///
    /// The identity field is restored after `change` runs. Returns the
    /// record as it stands afterwards, or `None` if there is no record.
    pub fn update<F>(&self, identity: &HardwareId, change: F) -> Option<Device>
    where
        F: FnOnce(&mut Device),
    {
        let committed = self.devices.upsert_with(identity.clone(), |current| {
            let current = current?;
            let mut next = current.clone();
            change(&mut next);
            next.identity = current.identity.clone();
            (next != *current).then_some(next)
        });

        match committed {
            Some(saved) => {
                debug!(identity = %identity, "Device record updated");
                self.persist();
                Some((*saved).clone())
            }
            None => self.find(identity),
        }
    }

    /// Set or clear the user-chosen name.
    pub fn rename(&self, identity: &HardwareId, name: Option<String>) -> Option<Device> {
        let name = name.filter(|n| !n.trim().is_empty());
        self.update(identity, |d| d.custom_name = name)
    }

    pub fn set_hidden(&self, identity: &HardwareId, hidden: bool) -> Option<Device> {
        self.update(identity, |d| d.hidden = hidden)
    }

    /// Remove the record for `identity`. Returns the removed record.
    pub fn delete(&self, identity: &HardwareId) -> Option<Device> {
        let removed = self.devices.remove(identity)?;
        info!(identity = %identity, "Device removed from registry");
        self.persist();
        Some((*removed).clone())
    }

    /// Serialize a read-decide-write sequence for one identity.
    ///
    /// Single record writes are already atomic; this lock is for callers
    /// whose decision depends on what they read.
    pub async fn lock_identity(&self, identity: &HardwareId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.identity_locks.entry(identity.clone()).or_default().value());
        lock.lock_owned().await
    }

    /// Wait until every change committed so far has reached the backend.
    pub async fn flush(&self) {
        let pending = std::mem::take(
            &mut *self.pending_saves.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in pending {
            if let Err(e) = task.await {
                warn!(error = %e, "Registry save task failed");
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Write the current contents to the backend.
    ///
    /// Inside a runtime the write runs on the blocking pool; elsewhere it
    /// runs inline. Each save reads the newest snapshot once it holds the
    /// persist lock, so saves finishing out of order still leave the
    /// latest state on disk.
    fn persist(&self) {
        let job = self.save_job();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn_blocking(job);
                let mut pending = self.pending_saves.lock().unwrap_or_else(PoisonError::into_inner);
                pending.retain(|t| !t.is_finished());
                pending.push(task);
            }
            Err(_) => job(),
        }
    }

    fn save_job(&self) -> impl FnOnce() + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let lock = Arc::clone(&self.persist_lock);
        let latest: watch::Receiver<_> = self.devices.subscribe();
        move || {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let snapshot = latest.borrow().clone();
            if let Err(e) = backend.save(&snapshot) {
                warn!(error = %e, "Registry change kept in memory only");
            }
        }
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::UpdateChannel;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn id(raw: &str) -> HardwareId {
        HardwareId::new(raw)
    }

    fn device(identity: &str, address: &str) -> Device {
        Device::new(id(identity), address)
    }

    #[test]
    fn upsert_creates_and_finds() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("aa:bb:cc:dd:ee:01", "10.0.0.5")).unwrap();

        let found = registry.find(&id("aabbccddee01")).unwrap();
        assert_eq!(found.address, "10.0.0.5");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn upsert_without_identity_is_rejected() {
        let registry = DeviceRegistry::in_memory();
        let err = registry.upsert(device("", "10.0.0.5")).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn identical_upsert_publishes_nothing() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("01", "10.0.0.5")).unwrap();
        let changes = registry.changes();

        registry.upsert(device("01", "10.0.0.5")).unwrap();
        assert!(!changes.has_changed());

        registry.upsert(device("01", "10.0.0.6")).unwrap();
        assert!(changes.has_changed());
    }

    #[test]
    fn upsert_merges_last_writer_wins_per_field() {
        let registry = DeviceRegistry::in_memory();
        let mut first = device("01", "10.0.0.5");
        first.custom_name = Some("Kitchen".into());
        first.update_channel = UpdateChannel::Beta;
        registry.upsert(first).unwrap();

        let mut second = device("01", "10.0.0.9");
        second.reported_name = Some("WLED".into());
        let merged = registry.upsert(second).unwrap();

        assert_eq!(merged.address, "10.0.0.9");
        assert_eq!(merged.custom_name.as_deref(), Some("Kitchen"));
        assert_eq!(merged.reported_name.as_deref(), Some("WLED"));
        assert_eq!(merged.update_channel, UpdateChannel::Beta);
    }

    #[test]
    fn update_cannot_change_identity() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("01", "10.0.0.5")).unwrap();

        let updated = registry
            .update(&id("01"), |d| {
                d.identity = id("02");
                d.address = "10.0.0.7".into();
            })
            .unwrap();

        assert_eq!(updated.identity, id("01"));
        assert_eq!(updated.address, "10.0.0.7");
        assert!(registry.find(&id("02")).is_none());
    }

    #[test]
    fn update_missing_record_returns_none() {
        let registry = DeviceRegistry::in_memory();
        assert!(registry.update(&id("01"), |d| d.hidden = true).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn rename_with_blank_clears_custom_name() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("01", "10.0.0.5")).unwrap();

        let renamed = registry.rename(&id("01"), Some("Porch".into())).unwrap();
        assert_eq!(renamed.display_name(), "Porch");

        let cleared = registry.rename(&id("01"), Some("  ".into())).unwrap();
        assert_eq!(cleared.custom_name, None);
    }

    #[test]
    fn delete_removes_and_publishes() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("01", "10.0.0.5")).unwrap();
        let changes = registry.changes();

        assert!(registry.delete(&id("01")).is_some());
        assert!(registry.delete(&id("01")).is_none());
        assert!(changes.has_changed());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn snapshot_is_identity_ordered() {
        let registry = DeviceRegistry::in_memory();
        registry.upsert(device("03", "c")).unwrap();
        registry.upsert(device("01", "a")).unwrap();
        registry.upsert(device("02", "b")).unwrap();

        let addresses: Vec<String> = registry.snapshot().iter().map(|d| d.address.clone()).collect();
        assert_eq!(addresses, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn changes_yield_new_snapshot() {
        let registry = DeviceRegistry::in_memory();
        let mut changes = registry.changes();
        assert!(changes.current().is_empty());

        registry.upsert(device("01", "10.0.0.5")).unwrap();
        let snap = changes.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(changes.current().len(), 1);
    }

    #[tokio::test]
    async fn lock_identity_serializes_holders() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let guard = registry.lock_identity(&id("01")).await;

        let contender = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _guard = registry.lock_identity(&id("01")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        // A different identity is not blocked.
        let _other = registry.lock_identity(&id("02")).await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn saves_inside_runtime_complete_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let registry = DeviceRegistry::open_file(&path).unwrap();

        for n in 0..20 {
            registry.upsert(device("01", &format!("10.0.0.{n}"))).unwrap();
        }
        registry.flush().await;

        let reopened = DeviceRegistry::open_file(&path).unwrap();
        assert_eq!(reopened.find(&id("01")).unwrap().address, "10.0.0.19");
    }

    #[tokio::test]
    async fn unchanged_update_does_not_save() {
        let backend = crate::testing::CountingBackend::default();
        let registry = DeviceRegistry::open(Box::new(backend.clone())).unwrap();
        registry.upsert(device("01", "10.0.0.5")).unwrap();
        registry.flush().await;
        assert_eq!(backend.saves(), 1);

        registry.update(&id("01"), |d| d.address = "10.0.0.5".into());
        registry.set_hidden(&id("01"), false);
        registry.flush().await;
        assert_eq!(backend.saves(), 1);
    }

    // ── File backend ─────────────────────────────────────────────────

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("devices.json");

        {
            let registry = DeviceRegistry::open_file(&path).unwrap();
            let mut d = device("01", "10.0.0.5");
            d.custom_name = Some("Desk".into());
            registry.upsert(d).unwrap();
            registry.upsert(device("02", "10.0.0.6")).unwrap();
            registry.delete(&id("02"));
        }

        let reopened = DeviceRegistry::open_file(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.find(&id("01")).unwrap().display_name(), "Desk");
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::open_file(dir.path().join("none.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = DeviceRegistry::open_file(&path).unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
    }

    #[test]
    fn write_failure_keeps_value_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every save fail.
        let path = dir.path().join("devices.json");
        std::fs::create_dir(&path).unwrap();

        let registry = DeviceRegistry::with_backend(Box::new(JsonFileBackend::new(&path)));
        registry.upsert(device("01", "10.0.0.5")).unwrap();

        assert_eq!(registry.find(&id("01")).unwrap().address, "10.0.0.5");
    }
}
