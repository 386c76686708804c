//! Catalog of system fields per item type.
//!
//! The registry is the only place that knows which fields exist, which item
//! types they belong to and whether they are shown before the user adds
//! them. The built-in catalog mirrors the shared field definitions every
//! client surface consumes; other catalogs can be loaded from their
//! versioned JSON form.

use crate::error::{EditError, EditResult};
use crate::field_type::FieldType;
use crate::models::ItemType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Catalog format version this build understands.
pub const CATALOG_VERSION: u32 = 1;

/// Prefix shared by every custom field key.
pub const CUSTOM_FIELD_PREFIX: &str = "custom_";

/// Well-known system field keys.
pub mod keys {
    pub const LOGIN_URL: &str = "login.url";
    pub const LOGIN_EMAIL: &str = "login.email";
    pub const LOGIN_USERNAME: &str = "login.username";
    pub const LOGIN_PASSWORD: &str = "login.password";
    pub const ALIAS_FIRST_NAME: &str = "alias.first_name";
    pub const ALIAS_LAST_NAME: &str = "alias.last_name";
    pub const ALIAS_NICKNAME: &str = "alias.nickname";
    pub const ALIAS_GENDER: &str = "alias.gender";
    pub const ALIAS_BIRTHDATE: &str = "alias.birthdate";
    pub const CARD_CARDHOLDER_NAME: &str = "card.cardholder_name";
    pub const CARD_NUMBER: &str = "card.number";
    pub const CARD_EXPIRY_MONTH: &str = "card.expiry_month";
    pub const CARD_EXPIRY_YEAR: &str = "card.expiry_year";
    pub const CARD_CVV: &str = "card.cvv";
    pub const CARD_PIN: &str = "card.pin";
    pub const NOTES_CONTENT: &str = "notes.content";
}

/// Grouping used when laying fields out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldCategory {
    /// Rendered inline with the item name.
    Primary,
    Login,
    Alias,
    Card,
    Notes,
    Metadata,
}

impl FieldCategory {
    /// Whether fields of this category go in the collapsible notes/metadata section.
    pub fn is_secondary_section(self) -> bool {
        matches!(self, FieldCategory::Notes | FieldCategory::Metadata)
    }
}

/// Definition of one system field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemFieldDefinition {
    pub field_key: String,
    pub label: String,
    pub category: FieldCategory,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_multi_value: bool,
    #[serde(default)]
    pub is_hidden: bool,
    pub default_display_order: i32,
    /// Item types this field can be added to.
    pub applies_to: Vec<ItemType>,
    /// Item types that render this field without the user adding it.
    #[serde(default)]
    pub shown_by_default_for: Vec<ItemType>,
}

impl SystemFieldDefinition {
    pub fn shown_by_default(&self, item_type: ItemType) -> bool {
        self.shown_by_default_for.contains(&item_type)
    }

    pub fn applies_to(&self, item_type: ItemType) -> bool {
        self.applies_to.contains(&item_type)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    version: u32,
    fields: Vec<SystemFieldDefinition>,
}

/// Immutable catalog of system fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    version: u32,
    fields: Vec<SystemFieldDefinition>,
}

impl FieldRegistry {
    /// The process-wide built-in catalog.
    pub fn builtin() -> Arc<FieldRegistry> {
        static BUILTIN: OnceLock<Arc<FieldRegistry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                Arc::new(FieldRegistry {
                    version: CATALOG_VERSION,
                    fields: builtin_fields(),
                })
            })
            .clone()
    }

    /// Load a catalog from its JSON distribution form.
    pub fn from_json(json: &str) -> EditResult<FieldRegistry> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        if doc.version > CATALOG_VERSION {
            return Err(EditError::CatalogVersion {
                supported: CATALOG_VERSION,
                found: doc.version,
            });
        }

        let mut seen = HashSet::new();
        for def in &doc.fields {
            if def.field_key.starts_with(CUSTOM_FIELD_PREFIX) {
                return Err(EditError::Catalog(format!(
                    "system key '{}' uses the custom field prefix",
                    def.field_key
                )));
            }
            if !seen.insert(def.field_key.as_str()) {
                return Err(EditError::Catalog(format!(
                    "duplicate field key '{}'",
                    def.field_key
                )));
            }
            if let Some(t) = def
                .shown_by_default_for
                .iter()
                .find(|t| !def.applies_to.contains(t))
            {
                return Err(EditError::Catalog(format!(
                    "'{}' is shown by default for {t} but does not apply to it",
                    def.field_key
                )));
            }
        }

        tracing::debug!(
            "Loaded field catalog v{} with {} fields",
            doc.version,
            doc.fields.len()
        );
        Ok(FieldRegistry {
            version: doc.version,
            fields: doc.fields,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// All definitions in catalog order.
    pub fn all(&self) -> &[SystemFieldDefinition] {
        &self.fields
    }

    /// Fields that apply to an item type, ordered by default display order.
    pub fn fields_for(&self, item_type: ItemType) -> Vec<&SystemFieldDefinition> {
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .filter(|f| f.applies_to(item_type))
            .collect();
        fields.sort_by_key(|f| f.default_display_order);
        fields
    }

    pub fn shown_by_default(&self, field: &SystemFieldDefinition, item_type: ItemType) -> bool {
        field.shown_by_default(item_type)
    }

    pub fn get(&self, key: &str) -> Option<&SystemFieldDefinition> {
        self.fields.iter().find(|f| f.field_key == key)
    }

    pub fn is_system_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Whether a key belongs to a custom field.
pub fn is_custom_key(key: &str) -> bool {
    key.starts_with(CUSTOM_FIELD_PREFIX)
}

struct Def {
    key: &'static str,
    label: &'static str,
    category: FieldCategory,
    field_type: FieldType,
    multi: bool,
    hidden: bool,
    applies_to: &'static [ItemType],
    shown_for: &'static [ItemType],
}

const LOGINISH: &[ItemType] = &[ItemType::Login, ItemType::Alias];
const ALIAS: &[ItemType] = &[ItemType::Alias];
const CARD: &[ItemType] = &[ItemType::CreditCard];
const NONE: &[ItemType] = &[];

fn builtin_fields() -> Vec<SystemFieldDefinition> {
    use keys::*;
    use FieldCategory as C;
    use FieldType as T;

    let defs = [
        Def { key: LOGIN_URL, label: "Website", category: C::Primary, field_type: T::Url, multi: true, hidden: false, applies_to: LOGINISH, shown_for: LOGINISH },
        Def { key: LOGIN_EMAIL, label: "Email", category: C::Login, field_type: T::Email, multi: false, hidden: false, applies_to: LOGINISH, shown_for: LOGINISH },
        Def { key: LOGIN_USERNAME, label: "Username", category: C::Login, field_type: T::Text, multi: false, hidden: false, applies_to: LOGINISH, shown_for: LOGINISH },
        Def { key: LOGIN_PASSWORD, label: "Password", category: C::Login, field_type: T::Password, multi: false, hidden: true, applies_to: LOGINISH, shown_for: LOGINISH },
        Def { key: ALIAS_FIRST_NAME, label: "First name", category: C::Alias, field_type: T::Text, multi: false, hidden: false, applies_to: ALIAS, shown_for: ALIAS },
        Def { key: ALIAS_LAST_NAME, label: "Last name", category: C::Alias, field_type: T::Text, multi: false, hidden: false, applies_to: ALIAS, shown_for: ALIAS },
        Def { key: ALIAS_NICKNAME, label: "Nickname", category: C::Alias, field_type: T::Text, multi: false, hidden: false, applies_to: ALIAS, shown_for: NONE },
        Def { key: ALIAS_GENDER, label: "Gender", category: C::Alias, field_type: T::Text, multi: false, hidden: false, applies_to: ALIAS, shown_for: ALIAS },
        Def { key: ALIAS_BIRTHDATE, label: "Birth date", category: C::Alias, field_type: T::Date, multi: false, hidden: false, applies_to: ALIAS, shown_for: ALIAS },
        Def { key: CARD_CARDHOLDER_NAME, label: "Cardholder name", category: C::Card, field_type: T::Text, multi: false, hidden: false, applies_to: CARD, shown_for: CARD },
        Def { key: CARD_NUMBER, label: "Card number", category: C::Card, field_type: T::Number, multi: false, hidden: true, applies_to: CARD, shown_for: CARD },
        Def { key: CARD_EXPIRY_MONTH, label: "Expiry month", category: C::Card, field_type: T::Number, multi: false, hidden: false, applies_to: CARD, shown_for: CARD },
        Def { key: CARD_EXPIRY_YEAR, label: "Expiry year", category: C::Card, field_type: T::Number, multi: false, hidden: false, applies_to: CARD, shown_for: CARD },
        Def { key: CARD_CVV, label: "CVV", category: C::Card, field_type: T::Password, multi: false, hidden: true, applies_to: CARD, shown_for: CARD },
        Def { key: CARD_PIN, label: "PIN", category: C::Card, field_type: T::Password, multi: false, hidden: true, applies_to: CARD, shown_for: NONE },
        Def { key: NOTES_CONTENT, label: "Notes", category: C::Notes, field_type: T::TextArea, multi: false, hidden: false, applies_to: &ItemType::ALL, shown_for: &[ItemType::Note] },
    ];

    defs.into_iter()
        .enumerate()
        .map(|(i, d)| SystemFieldDefinition {
            field_key: d.key.to_string(),
            label: d.label.to_string(),
            category: d.category,
            field_type: d.field_type,
            is_multi_value: d.multi,
            is_hidden: d.hidden,
            default_display_order: (i as i32 + 1) * 10,
            applies_to: d.applies_to.to_vec(),
            shown_by_default_for: d.shown_for.to_vec(),
        })
        .collect()
}
