//! Decides which fields are rendered and how they are grouped.

use crate::custom_fields::CustomFieldDefinition;
use crate::models::{Item, ItemType};
use crate::registry::{is_custom_key, keys, FieldCategory, FieldRegistry, SystemFieldDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-session visibility inputs besides the registry default rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityState {
    /// Fields the user added from the "add field" menu.
    pub manually_added: BTreeSet<String>,
    /// Fields that had a value when the item was loaded.
    pub initially_visible: BTreeSet<String>,
}

impl VisibilityState {
    /// State for an item opened in edit mode.
    pub fn from_item(item: &Item) -> Self {
        Self {
            manually_added: BTreeSet::new(),
            initially_visible: item
                .fields
                .iter()
                .filter(|f| !f.value.is_blank())
                .map(|f| f.field_key.clone())
                .collect(),
        }
    }

    /// Mark a field as added by the user. Returns false if it already was.
    pub fn add(&mut self, key: &str) -> bool {
        self.manually_added.insert(key.to_string())
    }

    /// Forget every reason this session had to show the field.
    pub fn remove(&mut self, key: &str) {
        self.manually_added.remove(key);
        self.initially_visible.remove(key);
    }
}

/// A category section of the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup<'a> {
    pub category: FieldCategory,
    pub fields: Vec<&'a SystemFieldDefinition>,
}

/// The rendered field set, grouped for display.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout<'a> {
    /// Rendered inline with the item name.
    pub primary: Vec<&'a SystemFieldDefinition>,
    pub groups: Vec<FieldGroup<'a>>,
    /// Notes and metadata, rendered in a collapsible section.
    pub secondary: Vec<&'a SystemFieldDefinition>,
    pub custom: Vec<&'a CustomFieldDefinition>,
}

impl FieldLayout<'_> {
    /// Every visible key in layout order.
    pub fn keys(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.fields.iter()))
            .chain(self.secondary.iter())
            .map(|f| f.field_key.as_str())
            .chain(self.custom.iter().map(|c| c.temp_id.as_str()))
            .collect()
    }
}

/// Computes the render set from the registry and session state.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityResolver<'a> {
    registry: &'a FieldRegistry,
}

impl<'a> VisibilityResolver<'a> {
    pub fn new(registry: &'a FieldRegistry) -> Self {
        Self { registry }
    }

    /// Whether the field with `key` renders for the given type and state.
    /// System fields never show on a type they do not apply to.
    pub fn should_show(&self, key: &str, item_type: ItemType, state: &VisibilityState) -> bool {
        if is_custom_key(key) {
            return true;
        }
        let Some(def) = self.registry.get(key) else {
            return false;
        };
        def.applies_to(item_type)
            && (state.manually_added.contains(key)
                || state.initially_visible.contains(key)
                || self.registry.shown_by_default(def, item_type))
    }

    /// Visible system fields, in default display order.
    pub fn visible_system_fields(
        &self,
        item_type: ItemType,
        state: &VisibilityState,
    ) -> Vec<&'a SystemFieldDefinition> {
        let mut fields: Vec<_> = self
            .registry
            .all()
            .iter()
            .filter(|def| self.should_show(&def.field_key, item_type, state))
            .collect();
        fields.sort_by_key(|def| def.default_display_order);
        fields
    }

    /// Fields of the type the user can still add.
    pub fn addable(&self, item_type: ItemType, state: &VisibilityState) -> Vec<&'a SystemFieldDefinition> {
        self.registry
            .fields_for(item_type)
            .into_iter()
            .filter(|def| !self.should_show(&def.field_key, item_type, state))
            .collect()
    }

    /// Group the visible fields for display.
    pub fn layout<'c>(
        &self,
        item_type: ItemType,
        state: &VisibilityState,
        custom: &'c [CustomFieldDefinition],
    ) -> FieldLayout<'c>
    where
        'a: 'c,
    {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        let mut groups: Vec<FieldGroup<'c>> = Vec::new();

        for def in self.visible_system_fields(item_type, state) {
            match def.category {
                FieldCategory::Primary => primary.push(def),
                category if category.is_secondary_section() => secondary.push(def),
                category => match groups.iter_mut().find(|g| g.category == category) {
                    Some(group) => group.fields.push(def),
                    None => groups.push(FieldGroup {
                        category,
                        fields: vec![def],
                    }),
                },
            }
        }

        groups.sort_by_key(|g| g.category);
        for group in &mut groups {
            if group.category == FieldCategory::Login {
                group
                    .fields
                    .sort_by_key(|def| (login_rank(&def.field_key), def.default_display_order));
            }
        }

        let mut custom: Vec<_> = custom.iter().collect();
        custom.sort_by_key(|c| c.display_order);

        FieldLayout {
            primary,
            groups,
            secondary,
            custom,
        }
    }

    /// Drop manual and initial entries that do not apply to `item_type`.
    pub fn retain_for_type(&self, state: &mut VisibilityState, item_type: ItemType) {
        let applies = |key: &String| {
            self.registry
                .get(key)
                .map_or(true, |def| def.applies_to(item_type))
        };
        state.manually_added.retain(applies);
        state.initially_visible.retain(applies);
    }
}

fn login_rank(key: &str) -> u8 {
    match key {
        keys::LOGIN_EMAIL => 0,
        keys::LOGIN_USERNAME => 1,
        keys::LOGIN_PASSWORD => 2,
        _ => 3,
    }
}
