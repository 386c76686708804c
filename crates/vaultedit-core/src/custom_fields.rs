//! User-authored fields layered on top of the value store.

use crate::error::{EditError, EditResult};
use crate::field_type::FieldType;
use crate::models::ItemField;
use crate::registry::{is_custom_key, FieldRegistry, CUSTOM_FIELD_PREFIX};
use crate::store::FieldValueStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Source of fresh custom field ids.
pub trait KeyGenerator: Send {
    /// Produce an id. The manager prefixes it with `custom_`.
    fn fresh_id(&mut self) -> String;
}

/// Random UUID ids.
#[derive(Debug, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn fresh_id(&mut self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic `1, 2, 3, …` ids.
#[derive(Debug, Default)]
pub struct SequentialKeyGenerator {
    next: u64,
}

impl SequentialKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyGenerator for SequentialKeyGenerator {
    fn fresh_id(&mut self) -> String {
        self.next += 1;
        self.next.to_string()
    }
}

/// A custom field before it is written to the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    /// Also the field key the value is stored under.
    pub temp_id: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_hidden: bool,
    pub display_order: i32,
}

/// Serializable part of the manager, carried in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldState {
    pub fields: Vec<CustomFieldDefinition>,
    /// Every key handed out this session, deleted ones included.
    pub issued: BTreeSet<String>,
}

const MAX_KEY_ATTEMPTS: usize = 64;

/// Creates, edits and deletes custom field definitions.
pub struct CustomFieldManager {
    registry: Arc<FieldRegistry>,
    state: CustomFieldState,
    generator: Box<dyn KeyGenerator>,
}

impl CustomFieldManager {
    pub fn new(registry: Arc<FieldRegistry>, generator: Box<dyn KeyGenerator>) -> Self {
        Self {
            registry,
            state: CustomFieldState::default(),
            generator,
        }
    }

    /// Seed definitions from the custom fields stored on an item.
    pub fn load_from_item(&mut self, fields: &[ItemField]) {
        self.state.fields = fields
            .iter()
            .filter(|f| is_custom_key(&f.field_key))
            .map(|f| CustomFieldDefinition {
                temp_id: f.field_key.clone(),
                label: f.label.clone(),
                field_type: f.field_type,
                is_hidden: f.is_hidden,
                display_order: f.display_order,
            })
            .collect();
        self.state.fields.sort_by_key(|f| f.display_order);
        self.state.issued = self.state.fields.iter().map(|f| f.temp_id.clone()).collect();
    }

    /// Replace the manager's state with a restored one.
    pub fn restore(&mut self, state: CustomFieldState) {
        let mut state = state;
        // A restored definition must never be handed out again.
        state
            .issued
            .extend(state.fields.iter().map(|f| f.temp_id.clone()));
        self.state = state;
    }

    pub fn state(&self) -> &CustomFieldState {
        &self.state
    }

    pub fn fields(&self) -> &[CustomFieldDefinition] {
        &self.state.fields
    }

    pub fn get(&self, temp_id: &str) -> Option<&CustomFieldDefinition> {
        self.state.fields.iter().find(|f| f.temp_id == temp_id)
    }

    pub fn contains(&self, temp_id: &str) -> bool {
        self.get(temp_id).is_some()
    }

    /// Create a field and return its key.
    pub fn add(&mut self, label: impl Into<String>, field_type: FieldType) -> EditResult<String> {
        let temp_id = self.allocate_key()?;
        let display_order = self
            .state
            .fields
            .iter()
            .map(|f| f.display_order)
            .max()
            .map_or(0, |max| max + 1);

        self.state.fields.push(CustomFieldDefinition {
            temp_id: temp_id.clone(),
            label: label.into(),
            field_type,
            is_hidden: field_type.is_secret(),
            display_order,
        });
        tracing::debug!("Added custom field {}", temp_id);
        Ok(temp_id)
    }

    /// Delete a field and its value.
    pub fn remove(&mut self, temp_id: &str, store: &mut FieldValueStore) -> EditResult<()> {
        let index = self.index_of(temp_id)?;
        self.state.fields.remove(index);
        store.delete(temp_id);
        Ok(())
    }

    pub fn relabel(&mut self, temp_id: &str, label: impl Into<String>) -> EditResult<()> {
        let index = self.index_of(temp_id)?;
        self.state.fields[index].label = label.into();
        Ok(())
    }

    pub fn set_hidden(&mut self, temp_id: &str, hidden: bool) -> EditResult<()> {
        let index = self.index_of(temp_id)?;
        self.state.fields[index].is_hidden = hidden;
        Ok(())
    }

    pub fn set_field_type(&mut self, temp_id: &str, field_type: FieldType) -> EditResult<()> {
        let index = self.index_of(temp_id)?;
        self.state.fields[index].field_type = field_type;
        Ok(())
    }

    /// Move a field to `to_index` (clamped) and renumber display orders.
    pub fn reorder(&mut self, temp_id: &str, to_index: usize) -> EditResult<()> {
        let from = self.index_of(temp_id)?;
        let field = self.state.fields.remove(from);
        let to = to_index.min(self.state.fields.len());
        self.state.fields.insert(to, field);
        for (i, f) in self.state.fields.iter_mut().enumerate() {
            f.display_order = i as i32;
        }
        Ok(())
    }

    fn index_of(&self, temp_id: &str) -> EditResult<usize> {
        self.state
            .fields
            .iter()
            .position(|f| f.temp_id == temp_id)
            .ok_or_else(|| EditError::UnknownField(temp_id.to_string()))
    }

    fn allocate_key(&mut self) -> EditResult<String> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = format!("{CUSTOM_FIELD_PREFIX}{}", self.generator.fresh_id());
            if self.registry.is_system_key(&key) || self.state.issued.contains(&key) {
                continue;
            }
            self.state.issued.insert(key.clone());
            return Ok(key);
        }
        Err(EditError::Generation(
            "could not allocate a unique custom field key".to_string(),
        ))
    }
}

impl std::fmt::Debug for CustomFieldManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomFieldManager")
            .field("fields", &self.state.fields.len())
            .field("issued", &self.state.issued.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn manager() -> CustomFieldManager {
        CustomFieldManager::new(
            FieldRegistry::builtin(),
            Box::new(SequentialKeyGenerator::new()),
        )
    }

    /// Always returns the same id.
    struct StuckGenerator;

    impl KeyGenerator for StuckGenerator {
        fn fresh_id(&mut self) -> String {
            "same".to_string()
        }
    }

    #[test]
    fn test_keys_are_unique_and_prefixed() {
        let mut manager = manager();
        let keys: Vec<_> = (0..10)
            .map(|i| manager.add(format!("Field {i}"), FieldType::Text).unwrap())
            .collect();
        let distinct: BTreeSet<_> = keys.iter().collect();
        assert_eq!(distinct.len(), 10);
        assert!(keys.iter().all(|k| k.starts_with(CUSTOM_FIELD_PREFIX)));
    }

    #[test]
    fn test_deleted_key_is_never_reissued() {
        let mut manager = CustomFieldManager::new(FieldRegistry::builtin(), Box::new(StuckGenerator));
        let mut store = FieldValueStore::new();
        let first = manager.add("PIN hint", FieldType::Text).unwrap();
        store.set(first.as_str(), "blue");
        manager.remove(&first, &mut store).unwrap();
        assert!(store.get(&first).is_none());

        // The only id the generator produces is burned.
        assert!(matches!(
            manager.add("Again", FieldType::Text),
            Err(EditError::Generation(_))
        ));
    }

    #[test]
    fn test_restored_keys_stay_reserved() {
        let mut manager = manager();
        manager.restore(CustomFieldState {
            fields: vec![CustomFieldDefinition {
                temp_id: "custom_1".into(),
                label: "Restored".into(),
                field_type: FieldType::Text,
                is_hidden: false,
                display_order: 0,
            }],
            issued: BTreeSet::new(),
        });
        let key = manager.add("New", FieldType::Text).unwrap();
        assert_eq!(key, "custom_2");
    }

    #[test]
    fn test_relabel_reorder_and_hidden() {
        let mut manager = manager();
        let a = manager.add("A", FieldType::Text).unwrap();
        let b = manager.add("B", FieldType::Password).unwrap();
        assert!(manager.get(&b).unwrap().is_hidden);

        manager.relabel(&a, "Alpha").unwrap();
        manager.reorder(&b, 0).unwrap();
        let labels: Vec<_> = manager.fields().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["B", "Alpha"]);
        assert_eq!(manager.get(&a).unwrap().display_order, 1);

        manager.set_hidden(&b, false).unwrap();
        assert!(!manager.get(&b).unwrap().is_hidden);
        assert!(matches!(
            manager.relabel("custom_missing", "x"),
            Err(EditError::UnknownField(_))
        ));
    }

    #[test]
    fn test_load_from_item_reserves_existing_keys() {
        let mut manager = manager();
        manager.load_from_item(&[ItemField {
            field_key: "custom_1".into(),
            label: "Security question".into(),
            field_type: FieldType::Text,
            value: FieldValue::from("Fluffy"),
            is_hidden: false,
            display_order: 3,
        }]);
        assert_eq!(manager.fields().len(), 1);
        assert_eq!(manager.add("Next", FieldType::Text).unwrap(), "custom_2");
        assert_eq!(manager.get("custom_2").unwrap().display_order, 4);
    }
}
