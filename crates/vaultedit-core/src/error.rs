//! Error types for the edit engine.
//!
//! Collaborators (vault, favicon, snapshot transport) report failures as
//! `anyhow::Error`; the controller folds them into the typed variants below
//! so callers can decide whether to stay on the screen or navigate away.

use thiserror::Error;

/// Errors raised by the item edit engine.
#[derive(Debug, Error)]
pub enum EditError {
    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------
    /// The requested item does not exist in the vault.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// The vault failed while reading the item or its related records.
    #[error("Failed to load item: {0}")]
    Load(String),

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------
    /// A persisted snapshot could not be parsed.
    #[error("Snapshot is corrupt: {0}")]
    SnapshotCorrupt(String),

    /// The snapshot transport failed.
    #[error("Snapshot store error: {0}")]
    Storage(String),

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------
    /// An identity or password generator failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    // ------------------------------------------------------------------
    // Save / delete
    // ------------------------------------------------------------------
    /// A field value was rejected by its field type.
    #[error("Invalid value for '{key}': {message}")]
    Validation { key: String, message: String },

    /// The vault rejected the create/update call.
    #[error("Failed to save item: {0}")]
    Save(String),

    /// The vault rejected the delete call.
    #[error("Failed to delete item: {0}")]
    Delete(String),

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------
    /// The operation is not allowed in the controller's current state.
    #[error("Operation '{operation}' not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A custom field id or system key was not found in the session.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The folder id is not one of the vault's folders.
    #[error("Unknown folder: {0}")]
    UnknownFolder(String),

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------
    /// A field catalog document was malformed.
    #[error("Invalid field catalog: {0}")]
    Catalog(String),

    /// A field catalog declared a version this build cannot read.
    #[error("Unsupported catalog version: expected at most {supported}, found {found}")]
    CatalogVersion { supported: u32, found: u32 },

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EditError {
    /// Build a validation error for a field key.
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the controller can keep the edit session open after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ItemNotFound(_) | Self::Load(_))
    }
}

/// Result alias used across the engine.
pub type EditResult<T> = Result<T, EditError>;
