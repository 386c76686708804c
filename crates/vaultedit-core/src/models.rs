//! Shared data types for vault items.

use crate::field_type::FieldType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of vault item. Each kind exposes a different field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Login,
    Alias,
    CreditCard,
    Note,
}

impl ItemType {
    /// All item types, in menu order.
    pub const ALL: [ItemType; 4] = [
        ItemType::Login,
        ItemType::Alias,
        ItemType::CreditCard,
        ItemType::Note,
    ];
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemType::Login => "login",
            ItemType::Alias => "alias",
            ItemType::CreditCard => "credit-card",
            ItemType::Note => "note",
        };
        f.write_str(name)
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "login" => Ok(ItemType::Login),
            "alias" => Ok(ItemType::Alias),
            "credit-card" | "creditcard" | "card" => Ok(ItemType::CreditCard),
            "note" => Ok(ItemType::Note),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// A field value: either a single string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl FieldValue {
    /// True when the value carries no non-whitespace content.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Single(s) => s.trim().is_empty(),
            FieldValue::Multi(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }

    /// Drop blank entries from multi-value content. Single values are returned as-is.
    pub fn without_blank_entries(self) -> Self {
        match self {
            FieldValue::Multi(values) => {
                FieldValue::Multi(values.into_iter().filter(|v| !v.trim().is_empty()).collect())
            }
            single => single,
        }
    }

    /// The first value, or the single value.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::Single(s) => Some(s.as_str()),
            FieldValue::Multi(values) => values.first().map(String::as_str),
        }
    }

    /// All values as a slice-like vector of `&str`.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Single(s) => vec![s.as_str()],
            FieldValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Single(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Single(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Multi(values)
    }
}

/// A stored field on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemField {
    pub field_key: String,
    pub label: String,
    pub field_type: FieldType,
    pub value: FieldValue,
    pub is_hidden: bool,
    pub display_order: i32,
}

/// A vault item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    pub folder_id: Option<String>,
    pub fields: Vec<ItemField>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub has_passkey: bool,
    /// Base64 encoded favicon image.
    #[serde(default)]
    pub logo: Option<String>,
}

impl Item {
    /// Create an empty item for create mode.
    pub fn new(item_type: ItemType) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: String::new(),
            item_type,
            folder_id: None,
            fields: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            has_passkey: false,
            logo: None,
        }
    }

    /// Look up a stored field by key.
    pub fn field(&self, key: &str) -> Option<&ItemField> {
        self.fields.iter().find(|f| f.field_key == key)
    }
}

/// A folder items can be filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

/// Represents a binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub blob: Vec<u8>,
}

/// A TOTP secret attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpCode {
    pub id: String,
    pub name: String,
    pub secret_key: String,
}

/// Gender of a generated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => f.write_str("Male"),
            Gender::Female => f.write_str("Female"),
        }
    }
}

/// The vault's preferred gender for generated identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenderPreference {
    #[default]
    Random,
    Male,
    Female,
}

impl FromStr for GenderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" | "" => Ok(Self::Random),
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(format!("unknown gender preference: {other}")),
        }
    }
}

/// Inclusive age range for generated identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl AgeRange {
    /// Oldest age accepted when parsing a setting.
    pub const MAX_AGE: u32 = 150;
}

impl Default for AgeRange {
    fn default() -> Self {
        Self { min: 21, max: 65 }
    }
}

impl FromStr for AgeRange {
    type Err = String;

    /// Parses `"21-65"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| format!("age range must look like 21-65, got {s}"))?;
        let min: u32 = min.trim().parse().map_err(|_| format!("invalid age: {min}"))?;
        let max: u32 = max.trim().parse().map_err(|_| format!("invalid age: {max}"))?;
        if min > max {
            return Err(format!("age range {min}-{max} is inverted"));
        }
        if max > Self::MAX_AGE {
            return Err(format!("ages above {} are not supported", Self::MAX_AGE));
        }
        Ok(Self { min, max })
    }
}

/// Birthdate bounds handed to the identity generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdateOptions {
    pub age_range: AgeRange,
    /// Reference date ages are measured from.
    pub today: NaiveDate,
}

/// A generated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    /// Local part used to build the alias email address.
    pub email_prefix: String,
}

/// Rules for the password generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSettings {
    pub length: usize,
    pub use_lowercase: bool,
    pub use_uppercase: bool,
    pub use_numbers: bool,
    pub use_special_chars: bool,
    pub use_non_ambiguous_chars: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            length: 18,
            use_lowercase: true,
            use_uppercase: true,
            use_numbers: true,
            use_special_chars: true,
            use_non_ambiguous_chars: false,
        }
    }
}
