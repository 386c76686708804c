//! Mutable state of one edit session.
//!
//! Everything the controller mutates lives here as plain owned fields, so
//! the generation ledger and the user's explicit mode choice are passed by
//! `&mut` into the coordinator and resolver instead of being captured
//! anywhere else.

use crate::custom_fields::{CustomFieldManager, KeyGenerator};
use crate::field_mode::{FieldModeResolver, KnownDomains};
use crate::generation::GenerationLedger;
use crate::models::{Attachment, Item, ItemType, TotpCode};
use crate::registry::{keys, FieldRegistry};
use crate::store::FieldValueStore;
use crate::visibility::VisibilityState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Collapsible sections the user opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionVisibility {
    pub notes: bool,
    pub totp: bool,
    pub attachments: bool,
}

/// UI sub-state that affects generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub ledger: GenerationLedger,
    pub email_mode: FieldModeResolver,
    /// Whether identity fields were generated in this session.
    pub has_generated: bool,
}

/// Working copy of an item plus everything needed to render its editor.
#[derive(Debug)]
pub struct EditSession {
    pub item: Item,
    pub values: FieldValueStore,
    pub custom_fields: CustomFieldManager,
    pub visibility: VisibilityState,
    pub generation: GenerationState,
    pub sections: SectionVisibility,
    pub attachments: Vec<Attachment>,
    pub original_attachment_ids: Vec<String>,
    pub totp_codes: Vec<TotpCode>,
    pub original_totp_ids: Vec<String>,
}

impl EditSession {
    /// Session for a fresh, unsaved item.
    pub fn blank(
        item_type: ItemType,
        registry: Arc<FieldRegistry>,
        key_generator: Box<dyn KeyGenerator>,
        domains: &KnownDomains,
    ) -> Self {
        Self {
            item: Item::new(item_type),
            values: FieldValueStore::new(),
            custom_fields: CustomFieldManager::new(registry, key_generator),
            visibility: VisibilityState::default(),
            generation: GenerationState {
                ledger: GenerationLedger::default(),
                email_mode: FieldModeResolver::initial_for("", domains),
                has_generated: false,
            },
            sections: SectionVisibility::default(),
            attachments: Vec::new(),
            original_attachment_ids: Vec::new(),
            totp_codes: Vec::new(),
            original_totp_ids: Vec::new(),
        }
    }

    /// Session seeded from a saved item.
    pub fn from_item(
        item: Item,
        registry: Arc<FieldRegistry>,
        key_generator: Box<dyn KeyGenerator>,
        domains: &KnownDomains,
    ) -> Self {
        let mut values = FieldValueStore::new();
        for field in &item.fields {
            values.set(field.field_key.clone(), field.value.clone());
        }
        let mut custom_fields = CustomFieldManager::new(registry, key_generator);
        custom_fields.load_from_item(&item.fields);

        let email_mode = FieldModeResolver::initial_for(values.get_str(keys::LOGIN_EMAIL), domains);
        let sections = SectionVisibility {
            notes: !values.is_blank(keys::NOTES_CONTENT),
            ..SectionVisibility::default()
        };

        Self {
            visibility: VisibilityState::from_item(&item),
            values,
            custom_fields,
            generation: GenerationState {
                ledger: GenerationLedger::default(),
                email_mode,
                // Saved aliases already carry their identity.
                has_generated: item.item_type == ItemType::Alias,
            },
            sections,
            item,
            attachments: Vec::new(),
            original_attachment_ids: Vec::new(),
            totp_codes: Vec::new(),
            original_totp_ids: Vec::new(),
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item.item_type
    }

    /// Attach the item's existing attachments and TOTP codes.
    pub fn set_related(&mut self, attachments: Vec<Attachment>, totp_codes: Vec<TotpCode>) {
        self.original_attachment_ids = attachments.iter().map(|a| a.id.clone()).collect();
        self.original_totp_ids = totp_codes.iter().map(|t| t.id.clone()).collect();
        self.sections.attachments = !attachments.is_empty();
        self.sections.totp = !totp_codes.is_empty();
        self.attachments = attachments;
        self.totp_codes = totp_codes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_fields::SequentialKeyGenerator;
    use crate::field_mode::FieldMode;
    use crate::field_type::FieldType;
    use crate::models::{FieldValue, ItemField};

    fn field(key: &str, value: &str) -> ItemField {
        ItemField {
            field_key: key.to_string(),
            label: key.to_string(),
            field_type: FieldType::Text,
            value: FieldValue::from(value),
            is_hidden: false,
            display_order: 0,
        }
    }

    #[test]
    fn test_from_item_seeds_values_and_visibility() {
        let mut item = Item::new(ItemType::Login);
        item.id = "item-1".into();
        item.fields = vec![
            field(keys::LOGIN_EMAIL, "jane@gmail.com"),
            field(keys::NOTES_CONTENT, "remember me"),
            field("custom_abc", "42"),
        ];
        let domains = KnownDomains::new(vec!["spamok.com".into()], vec![]);
        let session = EditSession::from_item(
            item,
            FieldRegistry::builtin(),
            Box::new(SequentialKeyGenerator::new()),
            &domains,
        );

        assert_eq!(session.values.get_str("custom_abc"), "42");
        assert!(session.visibility.initially_visible.contains(keys::NOTES_CONTENT));
        assert!(session.sections.notes);
        assert_eq!(session.custom_fields.fields().len(), 1);
        assert_eq!(session.generation.email_mode.mode(), FieldMode::FreeText);
        assert!(!session.generation.has_generated);
    }

    #[test]
    fn test_set_related_records_original_ids() {
        let mut session = EditSession::blank(
            ItemType::Login,
            FieldRegistry::builtin(),
            Box::new(SequentialKeyGenerator::new()),
            &KnownDomains::default(),
        );
        session.set_related(
            vec![Attachment {
                id: "att-1".into(),
                filename: "a.txt".into(),
                blob: b"hi".to_vec(),
            }],
            Vec::new(),
        );
        assert_eq!(session.original_attachment_ids, vec!["att-1".to_string()]);
        assert!(session.sections.attachments);
        assert!(!session.sections.totp);
    }
}
