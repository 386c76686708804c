//! Application state: the JSON vault file and edit session wiring.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultedit_core::{
    AgeRange, Attachment, EditTarget, FileSnapshotStore, Folder, GenderPreference,
    HttpFaviconFetcher, Item, ItemEditController, MemoryVault, PasswordSettings, TotpCode,
    VaultCollaborator, VaultData,
};

/// Controller type used by every command.
pub type Controller = ItemEditController<JsonFileVault, FileSnapshotStore, HttpFaviconFetcher>;

/// A [`MemoryVault`] backed by a JSON file, written after every change.
#[derive(Debug, Clone)]
pub struct JsonFileVault {
    path: Arc<PathBuf>,
    inner: MemoryVault,
}

impl JsonFileVault {
    /// Open the vault at `path`. A missing file is an empty vault.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read vault: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse vault: {}", path.display()))?
        } else {
            tracing::info!("No vault at {}, starting empty", path.display());
            VaultData::default()
        };
        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            inner: MemoryVault::from_data(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn items(&self) -> Result<Vec<Item>> {
        Ok(self.inner.snapshot()?.items)
    }

    pub fn add_folder(&self, name: &str) -> Result<Folder> {
        let folder = self.inner.add_folder(name)?;
        self.save()?;
        Ok(folder)
    }

    /// Write the vault to disk.
    pub fn save(&self) -> Result<()> {
        let data = self.inner.snapshot()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create vault directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(&data).context("Failed to serialize vault")?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write vault file: {}", tmp.display()))?;
        std::fs::rename(&tmp, self.path.as_path())
            .with_context(|| format!("Failed to replace vault file: {}", self.path.display()))
    }
}

#[async_trait]
impl VaultCollaborator for JsonFileVault {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<Item>> {
        self.inner.get_item_by_id(id).await
    }

    async fn create_item(
        &self,
        item: Item,
        attachments: Vec<Attachment>,
        totp_codes: Vec<TotpCode>,
    ) -> Result<String> {
        let id = self.inner.create_item(item, attachments, totp_codes).await?;
        self.save()?;
        Ok(id)
    }

    async fn update_item(
        &self,
        item: Item,
        original_attachment_ids: &[String],
        attachments: Vec<Attachment>,
        original_totp_ids: &[String],
        totp_codes: Vec<TotpCode>,
    ) -> Result<()> {
        self.inner
            .update_item(
                item,
                original_attachment_ids,
                attachments,
                original_totp_ids,
                totp_codes,
            )
            .await?;
        self.save()
    }

    async fn delete_item_by_id(&self, id: &str) -> Result<()> {
        self.inner.delete_item_by_id(id).await?;
        self.save()
    }

    async fn get_all_folders(&self) -> Result<Vec<Folder>> {
        self.inner.get_all_folders().await
    }

    async fn get_totp_codes_for_item(&self, item_id: &str) -> Result<Vec<TotpCode>> {
        self.inner.get_totp_codes_for_item(item_id).await
    }

    async fn get_attachments_for_item(&self, item_id: &str) -> Result<Vec<Attachment>> {
        self.inner.get_attachments_for_item(item_id).await
    }

    async fn get_password_settings(&self) -> Result<PasswordSettings> {
        self.inner.get_password_settings().await
    }

    async fn get_default_identity_gender(&self) -> Result<GenderPreference> {
        self.inner.get_default_identity_gender().await
    }

    async fn get_default_identity_age_range(&self) -> Result<AgeRange> {
        self.inner.get_default_identity_age_range().await
    }

    async fn get_effective_identity_language(&self) -> Result<String> {
        self.inner.get_effective_identity_language().await
    }

    async fn update_setting(&self, key: &str, value: &str) -> Result<()> {
        self.inner.update_setting(key, value).await?;
        self.save()
    }
}

/// Main application model.
pub struct App {
    pub config: Config,
    pub vault: JsonFileVault,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let vault = JsonFileVault::open(&config.vault_path)?;
        Ok(Self { config, vault })
    }

    pub fn snapshot_store(&self) -> FileSnapshotStore {
        FileSnapshotStore::new(self.config.snapshot_path.clone())
    }

    /// A controller for `target`, not yet loaded.
    pub fn controller(&self, target: EditTarget) -> Controller {
        ItemEditController::new(
            target,
            self.vault.clone(),
            self.snapshot_store(),
            HttpFaviconFetcher::new(),
            self.config.controller_options(),
        )
    }
}
