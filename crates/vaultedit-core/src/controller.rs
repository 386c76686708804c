//! Orchestrates one add/edit item session.
//!
//! The controller owns the [`EditSession`], drives the load → edit → save
//! lifecycle against a [`VaultCollaborator`], and writes a snapshot through
//! the [`PersistenceBridge`] after every change so an editor torn down
//! mid-edit can pick up where it left off.
//!
//! ```text
//! Loading ──► Editing ──► Saving ───► Done
//!                ▲  │        │
//!                │  └──► Deleting ─► Done
//!                └───────────┘ (on failure)
//! ```

use crate::custom_fields::{KeyGenerator, UuidKeyGenerator};
use crate::error::{EditError, EditResult};
use crate::favicon::{fetch_with_timeout, FaviconFetcher};
use crate::field_mode::{compose, split, FieldMode, KnownDomains, ModeAction};
use crate::field_type::FieldType;
use crate::generation::{
    GeneratedAlias, GeneratedField, GenerationCoordinator, GenerationLedger, GenerationSettings,
    GeneratorFactory, RandomGeneratorFactory,
};
use crate::models::{Attachment, BirthdateOptions, FieldValue, Folder, Item, ItemField, ItemType, TotpCode};
use crate::persistence::{PersistedSnapshot, PersistenceBridge, SkipRestoreFlag, SnapshotStore, SNAPSHOT_VERSION};
use crate::registry::{is_custom_key, keys, FieldRegistry, SystemFieldDefinition};
use crate::session::EditSession;
use crate::store::FieldValueStore;
use crate::vault::{VaultCollaborator, FALLBACK_IDENTITY_LANGUAGE};
use crate::visibility::{FieldLayout, VisibilityResolver};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Identity fields that only make sense on alias items.
const IDENTITY_KEYS: [&str; 5] = [
    keys::ALIAS_FIRST_NAME,
    keys::ALIAS_LAST_NAME,
    keys::ALIAS_NICKNAME,
    keys::ALIAS_GENDER,
    keys::ALIAS_BIRTHDATE,
];

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Loading,
    Editing,
    Saving,
    Deleting,
    Done,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Loading => "loading",
            ControllerState::Editing => "editing",
            ControllerState::Saving => "saving",
            ControllerState::Deleting => "deleting",
            ControllerState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Where the host should go after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    ToList,
    ToItem(String),
}

/// What the controller opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// A new item, optionally pre-filled from the page the user is on.
    Create {
        item_type: ItemType,
        service_url: Option<String>,
    },
    /// An existing item by id.
    Edit(String),
}

impl EditTarget {
    pub fn item_id(&self) -> Option<&str> {
        match self {
            EditTarget::Create { .. } => None,
            EditTarget::Edit(id) => Some(id),
        }
    }
}

/// URL and display name detected for a new item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrefill {
    pub url: String,
    pub name: String,
}

impl ServicePrefill {
    /// Derive a prefill from a URL or bare host. `https://www.github.com/x`
    /// becomes `{ url, name: "Github" }`.
    pub fn detect(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed = Url::parse(trimmed)
            .ok()
            .filter(|u| u.host_str().is_some())
            .or_else(|| Url::parse(&format!("https://{trimmed}")).ok())?;
        let host = parsed.host_str()?;
        let host = host.strip_prefix("www.").unwrap_or(host);

        let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
        let base = match labels.len() {
            0 => return None,
            1 => labels[0],
            n => labels[n - 2],
        };
        let mut chars = base.chars();
        let name: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => return None,
        };
        Some(Self {
            url: trimmed.to_string(),
            name,
        })
    }
}

/// Collapsible editor sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Notes,
    Totp,
    Attachments,
}

/// Asks the user to confirm a destructive action.
pub trait Confirmation {
    fn confirm_delete(&self, item: &Item) -> bool;
}

/// Confirmation that always answers the same.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmation for AutoConfirm {
    fn confirm_delete(&self, _item: &Item) -> bool {
        self.0
    }
}

/// Tunables for a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub fetch_favicons: bool,
    pub favicon_timeout: Duration,
    pub domains: KnownDomains,
    /// Minimum interval between snapshot writes.
    pub debounce: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            fetch_favicons: true,
            favicon_timeout: Duration::from_millis(3000),
            domains: KnownDomains::default(),
            debounce: Duration::ZERO,
        }
    }
}

/// Drives one add/edit session.
pub struct ItemEditController<V, S, F> {
    target: EditTarget,
    vault: V,
    favicons: F,
    bridge: PersistenceBridge<S>,
    registry: Arc<FieldRegistry>,
    generators: Box<dyn GeneratorFactory>,
    new_key_generator: fn() -> Box<dyn KeyGenerator>,
    options: ControllerOptions,
    state: ControllerState,
    session: EditSession,
    folders: Vec<Folder>,
    navigated_after_save: bool,
}

fn uuid_key_generator() -> Box<dyn KeyGenerator> {
    Box::new(UuidKeyGenerator)
}

impl<V, S, F> ItemEditController<V, S, F>
where
    V: VaultCollaborator,
    S: SnapshotStore,
    F: FaviconFetcher,
{
    pub fn new(target: EditTarget, vault: V, snapshots: S, favicons: F, options: ControllerOptions) -> Self {
        let registry = FieldRegistry::builtin();
        let item_type = match &target {
            EditTarget::Create { item_type, .. } => *item_type,
            EditTarget::Edit(_) => ItemType::Login,
        };
        let session = EditSession::blank(
            item_type,
            registry.clone(),
            uuid_key_generator(),
            &options.domains,
        );
        Self {
            target,
            vault,
            favicons,
            bridge: PersistenceBridge::new(snapshots, SkipRestoreFlag::new()).with_debounce(options.debounce),
            registry,
            generators: Box::new(RandomGeneratorFactory),
            new_key_generator: uuid_key_generator,
            options,
            state: ControllerState::Loading,
            session,
            folders: Vec::new(),
            navigated_after_save: false,
        }
    }

    pub fn with_registry(mut self, registry: Arc<FieldRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_generators(mut self, generators: Box<dyn GeneratorFactory>) -> Self {
        self.generators = generators;
        self
    }

    pub fn with_key_generator(mut self, new_key_generator: fn() -> Box<dyn KeyGenerator>) -> Self {
        self.new_key_generator = new_key_generator;
        self
    }

    /// Share a skip-restore flag with the host.
    pub fn with_skip_restore(mut self, flag: SkipRestoreFlag) -> Self {
        let debounce = self.options.debounce;
        let store = self.bridge.into_store();
        self.bridge = PersistenceBridge::new(store, flag).with_debounce(debounce);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn target(&self) -> &EditTarget {
        &self.target
    }

    pub fn is_create_mode(&self) -> bool {
        matches!(self.target, EditTarget::Create { .. })
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn item(&self) -> &Item {
        &self.session.item
    }

    pub fn values(&self) -> &FieldValueStore {
        &self.session.values
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn email_mode(&self) -> FieldMode {
        self.session.generation.email_mode.mode()
    }

    pub fn snapshot_store(&self) -> &S {
        self.bridge.store()
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Visible fields grouped for display.
    pub fn layout(&self) -> FieldLayout<'_> {
        VisibilityResolver::new(&self.registry).layout(
            self.session.item_type(),
            &self.session.visibility,
            self.session.custom_fields.fields(),
        )
    }

    /// Fields offered in the "add field" menu.
    pub fn addable(&self) -> Vec<&SystemFieldDefinition> {
        VisibilityResolver::new(&self.registry).addable(self.session.item_type(), &self.session.visibility)
    }

    pub fn is_visible(&self, key: &str) -> bool {
        VisibilityResolver::new(&self.registry).should_show(
            key,
            self.session.item_type(),
            &self.session.visibility,
        )
    }

    /// Snapshot of the current session.
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            schema_version: SNAPSHOT_VERSION,
            item_id: self.target.item_id().map(str::to_string),
            item: self.session.item.clone(),
            field_values: self.session.values.clone(),
            custom_fields: self.session.custom_fields.state().clone(),
            generation: self.session.generation.clone(),
            sections: self.session.sections,
            manually_added: self.session.visibility.manually_added.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Load the item (or start a blank one), restore any snapshot and enter
    /// editing. A load failure ends the session and sends the host to the
    /// list.
    pub async fn load(&mut self) -> Navigation {
        if self.state != ControllerState::Loading {
            return Navigation::Stay;
        }
        match self.try_load().await {
            Ok(()) => {
                self.state = ControllerState::Editing;
                tracing::info!(
                    "Editing {} item{}",
                    self.session.item_type(),
                    self.target.item_id().map(|id| format!(" {id}")).unwrap_or_default()
                );
                Navigation::Stay
            }
            Err(e) => {
                tracing::error!("Failed to open item editor: {}", e);
                self.state = ControllerState::Done;
                Navigation::ToList
            }
        }
    }

    async fn try_load(&mut self) -> EditResult<()> {
        match self.target.clone() {
            EditTarget::Edit(id) => {
                let item = self
                    .vault
                    .get_item_by_id(&id)
                    .await
                    .map_err(|e| EditError::Load(format!("{e:#}")))?
                    .ok_or_else(|| EditError::ItemNotFound(id.clone()))?;
                let attachments = self
                    .vault
                    .get_attachments_for_item(&id)
                    .await
                    .map_err(|e| EditError::Load(format!("{e:#}")))?;
                let totp_codes = self
                    .vault
                    .get_totp_codes_for_item(&id)
                    .await
                    .map_err(|e| EditError::Load(format!("{e:#}")))?;

                self.session = EditSession::from_item(
                    item,
                    self.registry.clone(),
                    (self.new_key_generator)(),
                    &self.options.domains,
                );
                self.session.set_related(attachments, totp_codes);
            }
            EditTarget::Create {
                item_type,
                service_url,
            } => {
                self.session = EditSession::blank(
                    item_type,
                    self.registry.clone(),
                    (self.new_key_generator)(),
                    &self.options.domains,
                );
                if let Some(prefill) = service_url.as_deref().and_then(ServicePrefill::detect) {
                    self.apply_prefill(prefill);
                }
            }
        }

        match self.vault.get_all_folders().await {
            Ok(folders) => self.folders = folders,
            Err(e) => tracing::warn!("Failed to load folders: {:#}", e),
        }

        if let Some(snapshot) = self.bridge.load(self.target.item_id()).await {
            self.apply_snapshot(snapshot);
        }
        self.bridge.finish_loading();

        if self.generation_eligible() {
            if let Err(e) = self.run_generation().await {
                tracing::warn!("Automatic alias generation failed: {}", e);
            }
            self.persist().await;
        }
        Ok(())
    }

    fn apply_prefill(&mut self, prefill: ServicePrefill) {
        let item_type = self.session.item_type();
        if self
            .registry
            .get(keys::LOGIN_URL)
            .is_some_and(|def| def.applies_to(item_type))
        {
            self.session.values.set(keys::LOGIN_URL, vec![prefill.url]);
        }
        if self.session.item.name.trim().is_empty() {
            self.session.item.name = prefill.name;
        }
    }

    fn apply_snapshot(&mut self, snapshot: PersistedSnapshot) {
        self.session.item = snapshot.item;
        self.session.values = snapshot.field_values;
        self.session.custom_fields.restore(snapshot.custom_fields);
        self.session.generation = snapshot.generation;
        self.session.sections = snapshot.sections;
        self.session.visibility.manually_added = snapshot.manually_added;

        let email = self.session.values.get_str(keys::LOGIN_EMAIL).to_string();
        self.session
            .generation
            .email_mode
            .detect(&email, &self.options.domains);
    }

    /// Create-mode alias items get an identity once.
    fn generation_eligible(&self) -> bool {
        self.is_create_mode()
            && self.session.item_type() == ItemType::Alias
            && !self.session.generation.has_generated
    }

    // ------------------------------------------------------------------
    // Field edits
    // ------------------------------------------------------------------

    pub async fn set_name(&mut self, name: impl Into<String>) -> EditResult<()> {
        self.ensure_editing("set_name")?;
        self.session.item.name = name.into();
        self.persist().await;
        Ok(())
    }

    /// Store a typed value. Setting a hidden system field adds it.
    pub async fn set_field(&mut self, key: &str, value: impl Into<FieldValue>) -> EditResult<()> {
        self.ensure_editing("set_field")?;
        let mut value = value.into();

        if is_custom_key(key) {
            if !self.session.custom_fields.contains(key) {
                return Err(EditError::UnknownField(key.to_string()));
            }
        } else {
            let def = self
                .registry
                .get(key)
                .filter(|def| def.applies_to(self.session.item_type()))
                .ok_or_else(|| EditError::UnknownField(key.to_string()))?;
            if def.is_multi_value {
                if let FieldValue::Single(single) = value {
                    value = FieldValue::Multi(vec![single]);
                }
            }
            if !self.is_visible(key) {
                self.session.visibility.add(key);
            }
        }

        if key == keys::LOGIN_EMAIL {
            self.session
                .generation
                .email_mode
                .on_input(value.first().unwrap_or_default());
        }
        self.session.values.set(key, value);
        self.persist().await;
        Ok(())
    }

    /// Edit one entry of a multi-value field.
    pub async fn set_slot(&mut self, key: &str, index: usize, value: &str) -> EditResult<()> {
        self.ensure_editing("set_slot")?;
        if !self.registry.get(key).is_some_and(|def| def.is_multi_value) {
            return Err(EditError::UnknownField(key.to_string()));
        }
        self.session.values.set_slot(key, index, value);
        self.persist().await;
        Ok(())
    }

    /// Show an optional system field.
    pub async fn add_field(&mut self, key: &str) -> EditResult<()> {
        self.ensure_editing("add_field")?;
        let item_type = self.session.item_type();
        if !self.registry.get(key).is_some_and(|def| def.applies_to(item_type)) {
            return Err(EditError::UnknownField(key.to_string()));
        }
        if self.session.visibility.add(key) {
            self.persist().await;
        }
        Ok(())
    }

    /// Hide an optional system field and drop its value.
    pub async fn remove_field(&mut self, key: &str) -> EditResult<()> {
        self.ensure_editing("remove_field")?;
        if !self.registry.is_system_key(key) {
            return Err(EditError::UnknownField(key.to_string()));
        }
        self.session.visibility.remove(key);
        self.session.values.delete(key);
        self.persist().await;
        Ok(())
    }

    pub async fn set_folder(&mut self, folder_id: Option<&str>) -> EditResult<()> {
        self.ensure_editing("set_folder")?;
        if let Some(id) = folder_id {
            if !self.folders.iter().any(|f| f.id == id) {
                return Err(EditError::UnknownFolder(id.to_string()));
            }
        }
        self.session.item.folder_id = folder_id.map(str::to_string);
        self.persist().await;
        Ok(())
    }

    pub async fn set_section_visible(&mut self, section: Section, visible: bool) -> EditResult<()> {
        self.ensure_editing("set_section_visible")?;
        let sections = &mut self.session.sections;
        match section {
            Section::Notes => sections.notes = visible,
            Section::Totp => sections.totp = visible,
            Section::Attachments => sections.attachments = visible,
        }
        self.persist().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Custom fields
    // ------------------------------------------------------------------

    /// Create a custom field and return its key.
    pub async fn add_custom_field(&mut self, label: impl Into<String>, field_type: FieldType) -> EditResult<String> {
        self.ensure_editing("add_custom_field")?;
        let key = self.session.custom_fields.add(label, field_type)?;
        self.persist().await;
        Ok(key)
    }

    pub async fn remove_custom_field(&mut self, key: &str) -> EditResult<()> {
        self.ensure_editing("remove_custom_field")?;
        let session = &mut self.session;
        session.custom_fields.remove(key, &mut session.values)?;
        self.persist().await;
        Ok(())
    }

    pub async fn relabel_custom_field(&mut self, key: &str, label: impl Into<String>) -> EditResult<()> {
        self.ensure_editing("relabel_custom_field")?;
        self.session.custom_fields.relabel(key, label)?;
        self.persist().await;
        Ok(())
    }

    pub async fn reorder_custom_field(&mut self, key: &str, to_index: usize) -> EditResult<()> {
        self.ensure_editing("reorder_custom_field")?;
        self.session.custom_fields.reorder(key, to_index)?;
        self.persist().await;
        Ok(())
    }

    pub async fn set_custom_field_hidden(&mut self, key: &str, hidden: bool) -> EditResult<()> {
        self.ensure_editing("set_custom_field_hidden")?;
        self.session.custom_fields.set_hidden(key, hidden)?;
        self.persist().await;
        Ok(())
    }

    pub async fn set_custom_field_type(&mut self, key: &str, field_type: FieldType) -> EditResult<()> {
        self.ensure_editing("set_custom_field_type")?;
        self.session.custom_fields.set_field_type(key, field_type)?;
        self.persist().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attachments and TOTP
    // ------------------------------------------------------------------

    /// Attach a file. Returns the attachment id.
    pub async fn add_attachment(&mut self, filename: impl Into<String>, blob: Vec<u8>) -> EditResult<String> {
        self.ensure_editing("add_attachment")?;
        let id = uuid::Uuid::new_v4().to_string();
        self.session.attachments.push(Attachment {
            id: id.clone(),
            filename: filename.into(),
            blob,
        });
        self.session.sections.attachments = true;
        self.persist().await;
        Ok(id)
    }

    pub async fn remove_attachment(&mut self, id: &str) -> EditResult<()> {
        self.ensure_editing("remove_attachment")?;
        let before = self.session.attachments.len();
        self.session.attachments.retain(|a| a.id != id);
        if self.session.attachments.len() == before {
            return Err(EditError::UnknownField(id.to_string()));
        }
        self.persist().await;
        Ok(())
    }

    /// Add a TOTP secret. Returns the code id.
    pub async fn add_totp_code(&mut self, name: impl Into<String>, secret_key: impl Into<String>) -> EditResult<String> {
        self.ensure_editing("add_totp_code")?;
        let id = uuid::Uuid::new_v4().to_string();
        self.session.totp_codes.push(TotpCode {
            id: id.clone(),
            name: name.into(),
            secret_key: secret_key.into(),
        });
        self.session.sections.totp = true;
        self.persist().await;
        Ok(id)
    }

    pub async fn remove_totp_code(&mut self, id: &str) -> EditResult<()> {
        self.ensure_editing("remove_totp_code")?;
        let before = self.session.totp_codes.len();
        self.session.totp_codes.retain(|t| t.id != id);
        if self.session.totp_codes.len() == before {
            return Err(EditError::UnknownField(id.to_string()));
        }
        self.persist().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Type change and generation
    // ------------------------------------------------------------------

    /// Switch the item type.
    ///
    /// Leaving Alias drops every `alias.*` and `login.*` value except the
    /// URL. Once no identity field holds a value, generation is eligible
    /// again and runs as soon as a new item becomes an alias.
    pub async fn change_type(&mut self, new_type: ItemType) -> EditResult<()> {
        self.ensure_editing("change_type")?;
        let old_type = self.session.item_type();
        if old_type == new_type {
            return Ok(());
        }
        self.session.item.item_type = new_type;

        if old_type == ItemType::Alias {
            self.session.values.retain(|key| {
                !(key.starts_with("alias.") || (key.starts_with("login.") && key != keys::LOGIN_URL))
            });
            self.session.generation.ledger = GenerationLedger::default();
        }
        VisibilityResolver::new(&self.registry).retain_for_type(&mut self.session.visibility, new_type);

        if IDENTITY_KEYS.iter().all(|k| self.session.values.is_blank(k)) {
            self.session.generation.has_generated = false;
        }
        tracing::info!("Item type changed from {} to {}", old_type, new_type);

        if self.generation_eligible() {
            if let Err(e) = self.run_generation().await {
                tracing::warn!("Alias generation after type change failed: {}", e);
            }
        }
        self.persist().await;
        Ok(())
    }

    /// Generate a fresh identity, email, username and password.
    pub async fn generate_alias(&mut self) -> EditResult<GeneratedAlias> {
        self.ensure_editing("generate_alias")?;
        if self.session.item_type() != ItemType::Alias {
            return Err(EditError::InvalidState {
                operation: "generate_alias",
                state: format!("editing a {} item", self.session.item_type()),
            });
        }
        let generated = self.run_generation().await?;
        self.persist().await;
        Ok(generated)
    }

    /// Toggle the email field between alias and free-text entry.
    pub async fn toggle_email_mode(&mut self) -> EditResult<FieldMode> {
        self.ensure_editing("toggle_email_mode")?;
        match self.session.generation.email_mode.toggle() {
            ModeAction::None => {}
            ModeAction::ClearValue => {
                self.session.values.delete(keys::LOGIN_EMAIL);
            }
            ModeAction::Regenerate => self.regenerate_email().await,
        }
        self.persist().await;
        Ok(self.email_mode())
    }

    async fn run_generation(&mut self) -> EditResult<GeneratedAlias> {
        let settings = self.generation_settings().await;
        let coordinator = GenerationCoordinator::new(self.generators.as_ref());
        let session = &mut self.session;
        let generated =
            coordinator.generate_alias(&settings, &mut session.values, &mut session.generation.ledger)?;
        session.generation.has_generated = true;

        let email = session.values.get_str(keys::LOGIN_EMAIL).to_string();
        session.generation.email_mode.detect(&email, &self.options.domains);
        Ok(generated)
    }

    /// Point the email at the default alias domain, keeping the local part
    /// when there is one.
    async fn regenerate_email(&mut self) {
        let Some(domain) = self.options.domains.default_domain().map(str::to_string) else {
            tracing::debug!("No alias domain known, leaving email unchanged");
            return;
        };
        let current = self.session.values.get_str(keys::LOGIN_EMAIL).to_string();
        let local = split(current.trim()).0.trim().to_string();

        let local = if local.is_empty() {
            let settings = self.generation_settings().await;
            match self
                .generators
                .identity_generator(&settings.language)
                .generate_random_identity(
                    settings.gender,
                    &BirthdateOptions {
                        age_range: settings.age_range,
                        today: settings.today,
                    },
                ) {
                Ok(identity) => identity.email_prefix,
                Err(e) => {
                    tracing::warn!("Could not generate an alias address: {:#}", e);
                    return;
                }
            }
        } else {
            local
        };

        let email = compose(&local, &domain);
        self.session.values.set(keys::LOGIN_EMAIL, email.as_str());
        self.session.generation.ledger.record(GeneratedField::Email, email);
    }

    async fn generation_settings(&self) -> GenerationSettings {
        let language = logged_or(
            self.vault.get_effective_identity_language().await,
            "identity language",
            FALLBACK_IDENTITY_LANGUAGE.to_string(),
        );
        let gender = logged_or(
            self.vault.get_default_identity_gender().await,
            "identity gender",
            Default::default(),
        );
        let age_range = logged_or(
            self.vault.get_default_identity_age_range().await,
            "identity age range",
            Default::default(),
        );
        let password = logged_or(
            self.vault.get_password_settings().await,
            "password settings",
            Default::default(),
        );

        let email_mode = &self.session.generation.email_mode;
        let email_domain = if email_mode.user_overrode() && email_mode.mode() == FieldMode::FreeText {
            None
        } else {
            self.options.domains.default_domain().map(str::to_string)
        };

        GenerationSettings {
            language,
            gender,
            age_range,
            password,
            email_domain,
            today: Utc::now().date_naive(),
        }
    }

    // ------------------------------------------------------------------
    // Submit and delete
    // ------------------------------------------------------------------

    /// The item as it would be saved: visible non-empty values in layout
    /// order, serialized by their field types.
    pub fn build_item(&self) -> EditResult<Item> {
        let item_type = self.session.item_type();
        let layout = self.layout();
        let mut fields = Vec::new();

        for key in layout.keys() {
            if self.registry.get(key).is_some_and(|def| !def.applies_to(item_type)) {
                continue;
            }
            let Some(value) = self.session.values.get(key) else {
                continue;
            };
            if value.is_blank() {
                continue;
            }
            let (label, field_type, is_hidden, display_order) = match self.registry.get(key) {
                Some(def) => (def.label.clone(), def.field_type, def.is_hidden, def.default_display_order),
                None => match self.session.custom_fields.get(key) {
                    Some(def) => (def.label.clone(), def.field_type, def.is_hidden, def.display_order),
                    None => continue,
                },
            };

            for entry in value.values() {
                if entry.trim().is_empty() {
                    continue;
                }
                field_type
                    .validate(entry.trim())
                    .map_err(|message| EditError::validation(key, message))?;
            }
            let value = match value.clone().without_blank_entries() {
                FieldValue::Single(v) => FieldValue::Single(field_type.serialize(&v)),
                FieldValue::Multi(vs) => FieldValue::Multi(vs.iter().map(|v| field_type.serialize(v)).collect()),
            };

            fields.push(ItemField {
                field_key: key.to_string(),
                label,
                field_type,
                value,
                is_hidden,
                display_order,
            });
        }

        let mut item = self.session.item.clone();
        item.name = item.name.trim().to_string();
        item.fields = fields;
        Ok(item)
    }

    /// Save the item. Validation and vault errors keep the session in
    /// editing so the user can retry.
    pub async fn submit(&mut self) -> EditResult<Navigation> {
        self.ensure_editing("submit")?;
        let mut item = self.build_item()?;

        self.state = ControllerState::Saving;
        let url = item
            .field(keys::LOGIN_URL)
            .and_then(|f| f.value.first())
            .map(str::to_string);
        if let (true, Some(url)) = (self.options.fetch_favicons, url) {
            if let Some(logo) = fetch_with_timeout(&self.favicons, &url, self.options.favicon_timeout).await {
                item.logo = Some(logo);
            }
        }

        let result = match &self.target {
            EditTarget::Create { .. } => {
                self.vault
                    .create_item(item, self.session.attachments.clone(), self.session.totp_codes.clone())
                    .await
            }
            EditTarget::Edit(id) => {
                let id = id.clone();
                self.vault
                    .update_item(
                        item,
                        &self.session.original_attachment_ids,
                        self.session.attachments.clone(),
                        &self.session.original_totp_ids,
                        self.session.totp_codes.clone(),
                    )
                    .await
                    .map(|()| id)
            }
        };

        match result {
            Ok(id) => {
                if let Err(e) = self.bridge.clear().await {
                    tracing::warn!("Failed to clear edit snapshot: {}", e);
                }
                self.state = ControllerState::Done;
                self.navigated_after_save = true;
                tracing::info!("Saved item {}", id);
                Ok(Navigation::ToItem(id))
            }
            Err(e) => {
                tracing::error!("Failed to save item: {:#}", e);
                self.state = ControllerState::Editing;
                Err(EditError::Save(format!("{e:#}")))
            }
        }
    }

    /// Delete the open item after confirmation.
    pub async fn delete(&mut self, confirmation: &dyn Confirmation) -> EditResult<Navigation> {
        self.ensure_editing("delete")?;
        let EditTarget::Edit(id) = self.target.clone() else {
            return Err(EditError::InvalidState {
                operation: "delete",
                state: "creating a new item".to_string(),
            });
        };
        if !confirmation.confirm_delete(&self.session.item) {
            return Ok(Navigation::Stay);
        }

        self.state = ControllerState::Deleting;
        match self.vault.delete_item_by_id(&id).await {
            Ok(()) => {
                if let Err(e) = self.bridge.clear().await {
                    tracing::warn!("Failed to clear edit snapshot: {}", e);
                }
                self.state = ControllerState::Done;
                Ok(Navigation::ToList)
            }
            Err(e) => {
                tracing::error!("Failed to delete item {}: {:#}", id, e);
                self.state = ControllerState::Editing;
                Err(EditError::Delete(format!("{e:#}")))
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Write any debounced snapshot now.
    pub async fn flush(&mut self) -> EditResult<bool> {
        self.bridge.flush().await
    }

    /// The editor is closing for good: drop the snapshot unless the session
    /// already moved on to the saved item.
    pub async fn teardown(&mut self) {
        if self.navigated_after_save {
            return;
        }
        if let Err(e) = self.bridge.clear().await {
            tracing::warn!("Failed to clear edit snapshot on teardown: {}", e);
        }
    }

    fn ensure_editing(&self, operation: &'static str) -> EditResult<()> {
        if self.state == ControllerState::Editing {
            Ok(())
        } else {
            Err(EditError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    async fn persist(&mut self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.bridge.save(&snapshot).await {
            tracing::warn!("Failed to persist edit snapshot: {}", e);
        }
    }
}

fn logged_or<T>(result: anyhow::Result<T>, what: &str, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!("Failed to read {} from vault, using default: {:#}", what, e);
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_prefill_from_url() {
        let prefill = ServicePrefill::detect("https://www.github.com/login").unwrap();
        assert_eq!(prefill.name, "Github");
        assert_eq!(prefill.url, "https://www.github.com/login");

        let prefill = ServicePrefill::detect("accounts.google.com").unwrap();
        assert_eq!(prefill.name, "Google");
        assert_eq!(prefill.url, "accounts.google.com");
    }

    #[test]
    fn test_service_prefill_rejects_blank() {
        assert_eq!(ServicePrefill::detect("   "), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ControllerState::Editing.to_string(), "editing");
        assert_eq!(EditTarget::Edit("x".into()).item_id(), Some("x"));
        assert_eq!(
            EditTarget::Create {
                item_type: ItemType::Note,
                service_url: None
            }
            .item_id(),
            None
        );
    }
}
