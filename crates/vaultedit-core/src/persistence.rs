//! Snapshot persistence for edit sessions.
//!
//! Hosts tear editors down without warning (popups close on blur, mobile
//! screens unmount on navigation). The bridge writes the whole session to a
//! [`SnapshotStore`] after each change and offers it back on the next mount.
//!
//! | Case | Behavior |
//! |------|----------|
//! | Session still loading | write suppressed |
//! | Snapshot unparsable | treated as absent, logged |
//! | Snapshot for another item | ignored silently |
//! | Skip-restore flag set | next load returns nothing, flag consumed |

use crate::custom_fields::CustomFieldState;
use crate::error::{EditError, EditResult};
use crate::models::Item;
use crate::session::{GenerationState, SectionVisibility};
use crate::store::FieldValueStore;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Serialized copy of an in-progress edit session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub schema_version: u32,
    /// `None` for an item that has not been saved yet.
    pub item_id: Option<String>,
    pub item: Item,
    pub field_values: FieldValueStore,
    pub custom_fields: CustomFieldState,
    pub generation: GenerationState,
    pub sections: SectionVisibility,
    pub manually_added: BTreeSet<String>,
}

// ----------------------------------------------------------------------------
// Snapshot store
// ----------------------------------------------------------------------------

/// Transport for the serialized snapshot (IPC channel, storage API, file).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn persist(&self, json: String) -> anyhow::Result<()>;

    async fn get(&self) -> anyhow::Result<Option<String>>;

    async fn clear(&self) -> anyhow::Result<()>;
}

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current raw contents.
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Replace the raw contents without counting a write.
    pub fn set_contents(&self, json: Option<String>) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = json;
        }
    }

    /// Number of `persist` calls served.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn name(&self) -> &str {
        "MemorySnapshotStore"
    }

    async fn persist(&self, json: String) -> anyhow::Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        *guard = Some(json);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self) -> anyhow::Result<Option<String>> {
        let guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        Ok(guard.clone())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// Single-file store using write-then-rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    fn name(&self) -> &str {
        "FileSnapshotStore"
    }

    async fn persist(&self, json: String) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move snapshot into place: {}", self.path.display()))
    }

    async fn get(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read snapshot: {}", self.path.display())),
        }
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove snapshot: {}", self.path.display())),
        }
    }
}

// ----------------------------------------------------------------------------
// Bridge
// ----------------------------------------------------------------------------

/// One-shot flag telling the next load to start fresh.
#[derive(Debug, Clone, Default)]
pub struct SkipRestoreFlag(Arc<AtomicBool>);

impl SkipRestoreFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Read and reset the flag.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Saves, restores and clears session snapshots.
pub struct PersistenceBridge<S> {
    store: S,
    loading: bool,
    skip_restore: SkipRestoreFlag,
    debounce: Duration,
    last_write: Option<Instant>,
    pending: Option<String>,
}

impl<S: SnapshotStore> PersistenceBridge<S> {
    /// A bridge in its initial loading phase.
    pub fn new(store: S, skip_restore: SkipRestoreFlag) -> Self {
        Self {
            store,
            loading: true,
            skip_restore,
            debounce: Duration::ZERO,
            last_write: None,
            pending: None,
        }
    }

    /// Coalesce writes issued less than `debounce` apart.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// End the load phase; later saves reach the store.
    pub fn finish_loading(&mut self) {
        self.loading = false;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Persist a snapshot. Returns whether it reached the store.
    pub async fn save(&mut self, snapshot: &PersistedSnapshot) -> EditResult<bool> {
        if self.loading {
            tracing::debug!("Snapshot write suppressed while loading");
            return Ok(false);
        }
        let json = serde_json::to_string(snapshot)?;

        if let Some(last) = self.last_write {
            if !self.debounce.is_zero() && last.elapsed() < self.debounce {
                self.pending = Some(json);
                return Ok(false);
            }
        }
        self.write(json).await?;
        Ok(true)
    }

    /// Write a debounced snapshot, if any.
    pub async fn flush(&mut self) -> EditResult<bool> {
        match self.pending.take() {
            Some(json) => {
                self.write(json).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restore the snapshot for `current_item_id`, if there is one.
    pub async fn load(&mut self, current_item_id: Option<&str>) -> Option<PersistedSnapshot> {
        if self.skip_restore.take() {
            tracing::info!("Snapshot restore skipped for this session");
            return None;
        }

        let json = match self.store.get().await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read snapshot from {}: {:#}", self.store.name(), e);
                return None;
            }
        };

        let snapshot = match parse_snapshot(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Ignoring snapshot: {}", e);
                return None;
            }
        };

        if snapshot.item_id.as_deref() != current_item_id {
            return None;
        }
        tracing::info!("Restoring in-progress edit from {}", self.store.name());
        Some(snapshot)
    }

    /// Remove the stored snapshot and drop any pending write.
    pub async fn clear(&mut self) -> EditResult<()> {
        self.pending = None;
        self.store
            .clear()
            .await
            .map_err(|e| EditError::Storage(format!("{e:#}")))
    }

    async fn write(&mut self, json: String) -> EditResult<()> {
        self.store
            .persist(json)
            .await
            .map_err(|e| EditError::Storage(format!("{e:#}")))?;
        self.last_write = Some(Instant::now());
        tracing::debug!("Snapshot written to {}", self.store.name());
        Ok(())
    }
}

fn parse_snapshot(json: &str) -> EditResult<PersistedSnapshot> {
    let snapshot: PersistedSnapshot =
        serde_json::from_str(json).map_err(|e| EditError::SnapshotCorrupt(e.to_string()))?;
    if snapshot.schema_version > SNAPSHOT_VERSION {
        return Err(EditError::SnapshotCorrupt(format!(
            "schema version {} is newer than {}",
            snapshot.schema_version, SNAPSHOT_VERSION
        )));
    }
    Ok(snapshot)
}
