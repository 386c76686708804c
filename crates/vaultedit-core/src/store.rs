//! Sparse storage for in-progress field values.

use crate::models::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field key → value map holding every edit of the session.
///
/// Multi-value fields never store blank entries; the trailing empty slot the
/// editor shows for entry is produced by [`FieldValueStore::entry_slots`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValueStore {
    values: BTreeMap<String, FieldValue>,
}

impl FieldValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// The value as a single string. Multi-value fields yield their first entry.
    pub fn get_str(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(FieldValue::first)
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let value = value.into().without_blank_entries();
        self.values.insert(key.into(), value);
    }

    pub fn delete(&mut self, key: &str) -> Option<FieldValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// True when the key is absent or holds only whitespace.
    pub fn is_blank(&self, key: &str) -> bool {
        self.values.get(key).map_or(true, FieldValue::is_blank)
    }

    /// Slots for a multi-value editor: the stored entries plus one empty slot.
    pub fn entry_slots(&self, key: &str) -> Vec<String> {
        let mut slots: Vec<String> = match self.values.get(key) {
            Some(value) => value
                .values()
                .into_iter()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        slots.push(String::new());
        slots
    }

    /// Write one slot of a multi-value field. Writing past the end appends.
    pub fn set_slot(&mut self, key: &str, index: usize, value: &str) {
        let mut slots = self.entry_slots(key);
        if index < slots.len() {
            slots[index] = value.to_string();
        } else {
            slots.push(value.to_string());
        }
        self.set(key, FieldValue::Multi(slots));
    }

    /// Remove every key for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.values.retain(|k, _| keep(k));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries that carry content.
    pub fn non_empty(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.iter().filter(|(_, v)| !v.is_blank())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
