//! Field visibility and edit-session engine for vault items.
//!
//! This crate decides which fields an add/edit screen renders for each item
//! type, tracks generated versus typed values, and snapshots in-progress
//! edits so a torn-down editor can resume. Hosts (the CLI, or a UI shell)
//! drive it through [`ItemEditController`].

pub mod controller;
pub mod custom_fields;
pub mod error;
pub mod favicon;
pub mod field_mode;
pub mod field_type;
pub mod generation;
pub mod models;
pub mod persistence;
pub mod registry;
pub mod session;
pub mod store;
pub mod vault;
pub mod visibility;

pub use controller::{
    AutoConfirm, Confirmation, ControllerOptions, ControllerState, EditTarget, ItemEditController,
    Navigation, Section, ServicePrefill,
};
pub use custom_fields::{CustomFieldDefinition, CustomFieldManager, KeyGenerator, SequentialKeyGenerator, UuidKeyGenerator};
pub use error::{EditError, EditResult};
pub use favicon::{Favicon, FaviconFetcher, HttpFaviconFetcher, NoFavicon};
pub use field_mode::{FieldMode, FieldModeResolver, KnownDomains};
pub use field_type::{FieldType, RenderHint};
pub use generation::{
    GeneratedAlias, GeneratorFactory, IdentityGenerator, PasswordGenerator, RandomGeneratorFactory,
};
pub use models::{
    AgeRange, Attachment, FieldValue, Folder, Gender, GenderPreference, Identity, Item, ItemField,
    ItemType, PasswordSettings, TotpCode,
};
pub use persistence::{
    FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, PersistenceBridge, SkipRestoreFlag,
    SnapshotStore,
};
pub use registry::{keys, FieldCategory, FieldRegistry, SystemFieldDefinition};
pub use store::FieldValueStore;
pub use vault::{MemoryVault, VaultCollaborator, VaultData};
pub use visibility::{FieldLayout, VisibilityResolver, VisibilityState};
