//! Vault collaborator interface and an in-memory implementation.

use crate::models::{AgeRange, Attachment, Folder, GenderPreference, Item, PasswordSettings, TotpCode};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Setting keys understood by [`VaultCollaborator::update_setting`].
pub mod settings {
    pub const DEFAULT_IDENTITY_GENDER: &str = "DefaultIdentityGender";
    pub const DEFAULT_IDENTITY_AGE_RANGE: &str = "DefaultIdentityAgeRange";
    pub const DEFAULT_IDENTITY_LANGUAGE: &str = "DefaultIdentityLanguage";
    pub const PASSWORD_LENGTH: &str = "PasswordGenerationLength";
}

/// Language used when the vault has none configured.
pub const FALLBACK_IDENTITY_LANGUAGE: &str = "en";

/// Item storage the editor reads from and writes to.
#[async_trait]
pub trait VaultCollaborator: Send + Sync {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<Item>>;

    /// Store a new item. Returns the assigned id.
    async fn create_item(
        &self,
        item: Item,
        attachments: Vec<Attachment>,
        totp_codes: Vec<TotpCode>,
    ) -> Result<String>;

    async fn update_item(
        &self,
        item: Item,
        original_attachment_ids: &[String],
        attachments: Vec<Attachment>,
        original_totp_ids: &[String],
        totp_codes: Vec<TotpCode>,
    ) -> Result<()>;

    async fn delete_item_by_id(&self, id: &str) -> Result<()>;

    async fn get_all_folders(&self) -> Result<Vec<Folder>>;

    async fn get_totp_codes_for_item(&self, item_id: &str) -> Result<Vec<TotpCode>>;

    async fn get_attachments_for_item(&self, item_id: &str) -> Result<Vec<Attachment>>;

    async fn get_password_settings(&self) -> Result<PasswordSettings>;

    async fn get_default_identity_gender(&self) -> Result<GenderPreference>;

    async fn get_default_identity_age_range(&self) -> Result<AgeRange>;

    async fn get_effective_identity_language(&self) -> Result<String>;

    async fn update_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Generator-related vault settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub identity_gender: GenderPreference,
    #[serde(default)]
    pub identity_age_range: AgeRange,
    /// Empty means "use the fallback language".
    #[serde(default)]
    pub identity_language: String,
    /// Settings without a typed slot.
    #[serde(default)]
    pub other: BTreeMap<String, String>,
}

/// Full vault contents, serializable as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultData {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub attachments: BTreeMap<String, Vec<Attachment>>,
    #[serde(default)]
    pub totp_codes: BTreeMap<String, Vec<TotpCode>>,
    #[serde(default)]
    pub settings: VaultSettings,
}

/// Vault kept in memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    data: Arc<Mutex<VaultData>>,
    read_only: Arc<Mutex<bool>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: VaultData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            read_only: Arc::default(),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<VaultData> {
        Ok(self.lock()?.clone())
    }

    /// Reject every write while set.
    pub fn set_read_only(&self, read_only: bool) {
        if let Ok(mut guard) = self.read_only.lock() {
            *guard = read_only;
        }
    }

    pub fn add_folder(&self, name: impl Into<String>) -> Result<Folder> {
        let folder = Folder {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
        };
        self.lock()?.folders.push(folder.clone());
        Ok(folder)
    }

    fn lock(&self) -> Result<MutexGuard<'_, VaultData>> {
        self.data
            .lock()
            .map_err(|_| anyhow::anyhow!("vault lock poisoned"))
    }

    fn writable(&self) -> Result<MutexGuard<'_, VaultData>> {
        let read_only = self
            .read_only
            .lock()
            .map(|guard| *guard)
            .unwrap_or(false);
        if read_only {
            bail!("Vault is read-only");
        }
        self.lock()
    }
}

fn assign_id(id: &mut String) {
    if id.is_empty() {
        *id = uuid::Uuid::new_v4().to_string();
    }
}

#[async_trait]
impl VaultCollaborator for MemoryVault {
    async fn get_item_by_id(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.lock()?.items.iter().find(|i| i.id == id).cloned())
    }

    async fn create_item(
        &self,
        mut item: Item,
        mut attachments: Vec<Attachment>,
        mut totp_codes: Vec<TotpCode>,
    ) -> Result<String> {
        let mut data = self.writable()?;
        let now = Utc::now();
        item.id = uuid::Uuid::new_v4().to_string();
        item.created_at = now;
        item.updated_at = now;

        attachments.iter_mut().for_each(|a| assign_id(&mut a.id));
        totp_codes.iter_mut().for_each(|t| assign_id(&mut t.id));
        if !attachments.is_empty() {
            data.attachments.insert(item.id.clone(), attachments);
        }
        if !totp_codes.is_empty() {
            data.totp_codes.insert(item.id.clone(), totp_codes);
        }

        let id = item.id.clone();
        tracing::info!("Created {} item {}", item.item_type, id);
        data.items.push(item);
        Ok(id)
    }

    async fn update_item(
        &self,
        mut item: Item,
        original_attachment_ids: &[String],
        mut attachments: Vec<Attachment>,
        original_totp_ids: &[String],
        mut totp_codes: Vec<TotpCode>,
    ) -> Result<()> {
        let mut data = self.writable()?;
        let slot = data
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .with_context(|| format!("Item with id {} not found", item.id))?;
        item.created_at = slot.created_at;
        item.updated_at = Utc::now();
        *slot = item.clone();

        let removed_attachments = original_attachment_ids
            .iter()
            .filter(|id| !attachments.iter().any(|a| &a.id == *id))
            .count();
        let removed_totp = original_totp_ids
            .iter()
            .filter(|id| !totp_codes.iter().any(|t| &t.id == *id))
            .count();
        if removed_attachments + removed_totp > 0 {
            tracing::debug!(
                "Removing {} attachments and {} TOTP codes from {}",
                removed_attachments,
                removed_totp,
                item.id
            );
        }

        attachments.iter_mut().for_each(|a| assign_id(&mut a.id));
        totp_codes.iter_mut().for_each(|t| assign_id(&mut t.id));
        data.attachments.insert(item.id.clone(), attachments);
        data.totp_codes.insert(item.id.clone(), totp_codes);
        data.attachments.retain(|_, list| !list.is_empty());
        data.totp_codes.retain(|_, list| !list.is_empty());

        tracing::info!("Updated item {}", item.id);
        Ok(())
    }

    async fn delete_item_by_id(&self, id: &str) -> Result<()> {
        let mut data = self.writable()?;
        let before = data.items.len();
        data.items.retain(|i| i.id != id);
        if data.items.len() == before {
            bail!("Item with id {} not found", id);
        }
        data.attachments.remove(id);
        data.totp_codes.remove(id);
        tracing::info!("Deleted item {}", id);
        Ok(())
    }

    async fn get_all_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.lock()?.folders.clone())
    }

    async fn get_totp_codes_for_item(&self, item_id: &str) -> Result<Vec<TotpCode>> {
        Ok(self
            .lock()?
            .totp_codes
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_attachments_for_item(&self, item_id: &str) -> Result<Vec<Attachment>> {
        Ok(self
            .lock()?
            .attachments
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_password_settings(&self) -> Result<PasswordSettings> {
        Ok(self.lock()?.settings.password.clone())
    }

    async fn get_default_identity_gender(&self) -> Result<GenderPreference> {
        Ok(self.lock()?.settings.identity_gender)
    }

    async fn get_default_identity_age_range(&self) -> Result<AgeRange> {
        Ok(self.lock()?.settings.identity_age_range)
    }

    async fn get_effective_identity_language(&self) -> Result<String> {
        let language = self.lock()?.settings.identity_language.clone();
        if language.trim().is_empty() {
            Ok(FALLBACK_IDENTITY_LANGUAGE.to_string())
        } else {
            Ok(language)
        }
    }

    async fn update_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.writable()?;
        let current = &mut data.settings;
        match key {
            settings::DEFAULT_IDENTITY_GENDER => {
                current.identity_gender = value.parse().map_err(anyhow::Error::msg)?;
            }
            settings::DEFAULT_IDENTITY_AGE_RANGE => {
                current.identity_age_range = value.parse().map_err(anyhow::Error::msg)?;
            }
            settings::DEFAULT_IDENTITY_LANGUAGE => {
                current.identity_language = value.to_string();
            }
            settings::PASSWORD_LENGTH => {
                current.password.length = value
                    .parse()
                    .with_context(|| format!("Invalid password length: {value}"))?;
            }
            other => {
                current.other.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }
}
