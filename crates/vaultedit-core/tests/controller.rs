use anyhow::bail;
use async_trait::async_trait;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vaultedit_core::models::BirthdateOptions;
use vaultedit_core::{
    keys, Attachment, AutoConfirm, ControllerOptions, ControllerState, EditError, EditTarget,
    Favicon, FaviconFetcher, FieldMode, FieldType, FieldValue, Gender, GenderPreference,
    GeneratorFactory, Identity, IdentityGenerator, Item, ItemEditController, ItemField, ItemType,
    KeyGenerator, KnownDomains, MemorySnapshotStore, MemoryVault, Navigation, PasswordGenerator,
    PasswordSettings, SequentialKeyGenerator, SkipRestoreFlag, VaultCollaborator,
};

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

/// Generators whose n-th identity is `First{n}` / `alias{n}` and whose
/// password is `password-{n}`.
#[derive(Clone, Default)]
struct ScriptedGenerators {
    calls: Arc<AtomicUsize>,
}

struct ScriptedIdentity(usize);
struct ScriptedPassword(usize);

impl IdentityGenerator for ScriptedIdentity {
    fn generate_random_identity(
        &self,
        _gender: GenderPreference,
        _birthdate: &BirthdateOptions,
    ) -> anyhow::Result<Identity> {
        Ok(Identity {
            first_name: format!("First{}", self.0),
            last_name: format!("Last{}", self.0),
            nick_name: format!("nick{}", self.0),
            gender: Gender::Male,
            birth_date: NaiveDate::from_ymd_opt(1988, 3, 14).expect("valid date"),
            email_prefix: format!("alias{}", self.0),
        })
    }
}

impl PasswordGenerator for ScriptedPassword {
    fn generate_random_password(&self) -> anyhow::Result<String> {
        Ok(format!("password-{}", self.0))
    }
}

impl GeneratorFactory for ScriptedGenerators {
    fn identity_generator(&self, _language: &str) -> Box<dyn IdentityGenerator> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(ScriptedIdentity(n))
    }

    fn password_generator(&self, _settings: &PasswordSettings) -> Box<dyn PasswordGenerator> {
        Box::new(ScriptedPassword(self.calls.load(Ordering::SeqCst)))
    }
}

struct FixedFavicon;

#[async_trait]
impl FaviconFetcher for FixedFavicon {
    async fn fetch_favicon(&self, _url: &str) -> anyhow::Result<Favicon> {
        Ok(Favicon {
            image: "aWNvbg==".to_string(),
        })
    }
}

struct HangingFavicon;

#[async_trait]
impl FaviconFetcher for HangingFavicon {
    async fn fetch_favicon(&self, _url: &str) -> anyhow::Result<Favicon> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        bail!("unreachable")
    }
}

fn sequential_keys() -> Box<dyn KeyGenerator> {
    Box::new(SequentialKeyGenerator::new())
}

fn options() -> ControllerOptions {
    ControllerOptions {
        fetch_favicons: false,
        favicon_timeout: Duration::from_millis(500),
        domains: KnownDomains::new(vec!["spamok.com".into()], vec!["mine.example".into()]),
        debounce: Duration::ZERO,
    }
}

fn controller_with<F: FaviconFetcher>(
    target: EditTarget,
    vault: &MemoryVault,
    store: &MemorySnapshotStore,
    favicons: F,
    options: ControllerOptions,
) -> ItemEditController<MemoryVault, MemorySnapshotStore, F> {
    ItemEditController::new(target, vault.clone(), store.clone(), favicons, options)
        .with_generators(Box::new(ScriptedGenerators::default()))
        .with_key_generator(sequential_keys)
}

fn controller(
    target: EditTarget,
    vault: &MemoryVault,
    store: &MemorySnapshotStore,
) -> ItemEditController<MemoryVault, MemorySnapshotStore, FixedFavicon> {
    controller_with(target, vault, store, FixedFavicon, options())
}

fn create(item_type: ItemType) -> EditTarget {
    EditTarget::Create {
        item_type,
        service_url: None,
    }
}

fn field(key: &str, field_type: FieldType, value: &str) -> ItemField {
    ItemField {
        field_key: key.to_string(),
        label: key.to_string(),
        field_type,
        value: FieldValue::from(value),
        is_hidden: false,
        display_order: 0,
    }
}

async fn seed(vault: &MemoryVault, item_type: ItemType, name: &str, fields: Vec<ItemField>) -> String {
    let mut item = Item::new(item_type);
    item.name = name.to_string();
    item.fields = fields;
    vault
        .create_item(item, Vec::new(), Vec::new())
        .await
        .expect("seed item")
}

fn saved_id(nav: Navigation) -> String {
    match nav {
        Navigation::ToItem(id) => id,
        other => panic!("expected navigation to the saved item, got {other:?}"),
    }
}

// ----------------------------------------------------------------------------
// Create mode
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_create_login_without_edits_saves_only_detected_url() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let target = EditTarget::Create {
        item_type: ItemType::Login,
        service_url: Some("https://github.com/login".into()),
    };
    let mut c = controller(target, &vault, &store);

    assert_eq!(c.load().await, Navigation::Stay);
    assert_eq!(c.state(), ControllerState::Editing);

    let id = saved_id(c.submit().await.expect("submit"));
    let saved = vault.get_item_by_id(&id).await.unwrap().expect("saved item");

    assert_eq!(saved.name, "Github");
    assert_eq!(saved.fields.len(), 1);
    assert_eq!(saved.fields[0].field_key, keys::LOGIN_URL);
    assert_eq!(
        saved.fields[0].value,
        FieldValue::Multi(vec!["https://github.com/login".to_string()])
    );
    assert_eq!(c.state(), ControllerState::Done);
    assert_eq!(store.contents(), None);
}

#[tokio::test]
async fn test_create_alias_generates_once_on_load() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;

    assert_eq!(c.values().get_str(keys::ALIAS_FIRST_NAME), "First1");
    assert_eq!(c.values().get_str(keys::LOGIN_EMAIL), "alias1@mine.example");
    assert_eq!(c.values().get_str(keys::ALIAS_BIRTHDATE), "1988-03-14");
    assert_eq!(c.email_mode(), FieldMode::Alias);
    assert!(c.session().generation.has_generated);
    assert!(store.contents().is_some());
}

#[tokio::test]
async fn test_generation_keeps_user_username() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;

    c.set_field(keys::LOGIN_USERNAME, "myuser").await.unwrap();
    c.generate_alias().await.unwrap();
    let last = c.generate_alias().await.unwrap();

    assert_eq!(c.values().get_str(keys::LOGIN_USERNAME), "myuser");
    assert_eq!(c.values().get_str(keys::LOGIN_PASSWORD), "password-3");
    assert_eq!(c.values().get_str(keys::LOGIN_EMAIL), "alias3@mine.example");
    assert_eq!(c.values().get_str(keys::ALIAS_FIRST_NAME), "First3");
    assert_eq!(last.username, "nick3");
}

#[tokio::test]
async fn test_generate_alias_rejected_for_login() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Login), &vault, &store);
    c.load().await;

    let err = c.generate_alias().await.unwrap_err();
    assert!(matches!(err, EditError::InvalidState { operation: "generate_alias", .. }));
}

// ----------------------------------------------------------------------------
// Type change
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_alias_to_login_keeps_only_url() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;
    c.set_field(keys::LOGIN_URL, "https://x.com").await.unwrap();

    c.change_type(ItemType::Login).await.unwrap();

    assert_eq!(c.values().keys().collect::<Vec<_>>(), vec![keys::LOGIN_URL]);
    let id = saved_id(c.submit().await.unwrap());
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(saved.item_type, ItemType::Login);
    assert_eq!(
        saved.fields.iter().map(|f| f.field_key.as_str()).collect::<Vec<_>>(),
        vec![keys::LOGIN_URL]
    );
}

#[tokio::test]
async fn test_switching_back_to_alias_regenerates() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;

    c.change_type(ItemType::Login).await.unwrap();
    assert!(!c.session().generation.has_generated);
    assert!(c.values().is_blank(keys::ALIAS_FIRST_NAME));

    c.change_type(ItemType::Alias).await.unwrap();
    assert_eq!(c.values().get_str(keys::ALIAS_FIRST_NAME), "First2");
    assert!(c.session().generation.has_generated);
}

#[tokio::test]
async fn test_type_change_drops_foreign_manual_fields() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::CreditCard), &vault, &store);
    c.load().await;
    c.add_field(keys::CARD_PIN).await.unwrap();
    assert!(c.is_visible(keys::CARD_PIN));

    c.change_type(ItemType::Note).await.unwrap();
    assert!(!c.is_visible(keys::CARD_PIN));
    assert_eq!(c.layout().keys(), vec![keys::NOTES_CONTENT]);
}

#[tokio::test]
async fn test_edit_alias_to_card_hides_and_skips_old_fields() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(
        &vault,
        ItemType::Alias,
        "Shop",
        vec![
            field(keys::ALIAS_FIRST_NAME, FieldType::Text, "Ann"),
            field(keys::LOGIN_USERNAME, FieldType::Text, "ann42"),
        ],
    )
    .await;

    let mut c = controller(EditTarget::Edit(id.clone()), &vault, &store);
    c.load().await;
    c.change_type(ItemType::CreditCard).await.unwrap();

    assert!(c.layout().keys().iter().all(|k| k.starts_with("card.")));
    assert!(matches!(
        c.set_field(keys::ALIAS_FIRST_NAME, "Bea").await,
        Err(EditError::UnknownField(_))
    ));
    c.set_field(keys::CARD_CARDHOLDER_NAME, "Ann Smith").await.unwrap();

    c.submit().await.unwrap();
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(saved.item_type, ItemType::CreditCard);
    assert_eq!(
        saved.fields.iter().map(|f| f.field_key.as_str()).collect::<Vec<_>>(),
        vec![keys::CARD_CARDHOLDER_NAME]
    );
}

#[tokio::test]
async fn test_edit_login_to_note_keeps_only_note_fields() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(
        &vault,
        ItemType::Login,
        "Forum",
        vec![
            field(keys::LOGIN_USERNAME, FieldType::Text, "bob"),
            field(keys::LOGIN_PASSWORD, FieldType::Password, "hunter2"),
        ],
    )
    .await;

    let mut c = controller(EditTarget::Edit(id.clone()), &vault, &store);
    c.load().await;
    c.change_type(ItemType::Note).await.unwrap();
    assert_eq!(c.layout().keys(), vec![keys::NOTES_CONTENT]);

    c.set_field(keys::NOTES_CONTENT, "moved").await.unwrap();
    c.submit().await.unwrap();
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(
        saved.fields.iter().map(|f| f.field_key.as_str()).collect::<Vec<_>>(),
        vec![keys::NOTES_CONTENT]
    );
}

// ----------------------------------------------------------------------------
// Visibility
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_blank_initially_visible_field_stays_rendered() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(
        &vault,
        ItemType::CreditCard,
        "Visa",
        vec![
            field(keys::CARD_NUMBER, FieldType::Number, "4111 1111 1111 1111"),
            field(keys::CARD_PIN, FieldType::Password, "1234"),
        ],
    )
    .await;

    let mut c = controller(EditTarget::Edit(id.clone()), &vault, &store);
    c.load().await;
    c.set_field(keys::CARD_PIN, "").await.unwrap();

    assert!(c.layout().keys().contains(&keys::CARD_PIN));

    c.submit().await.unwrap();
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert!(saved.field(keys::CARD_PIN).is_none());
    assert_eq!(
        saved.field(keys::CARD_NUMBER).map(|f| f.value.clone()),
        Some(FieldValue::from("4111111111111111"))
    );
}

#[tokio::test]
async fn test_add_then_remove_field_restores_layout() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::CreditCard), &vault, &store);
    c.load().await;
    let before: Vec<String> = c.layout().keys().into_iter().map(str::to_string).collect();
    assert!(c.addable().iter().any(|f| f.field_key == keys::CARD_PIN));

    c.add_field(keys::CARD_PIN).await.unwrap();
    c.set_field(keys::CARD_PIN, "9999").await.unwrap();
    assert!(c.addable().iter().all(|f| f.field_key != keys::CARD_PIN));
    c.remove_field(keys::CARD_PIN).await.unwrap();

    let after: Vec<String> = c.layout().keys().into_iter().map(str::to_string).collect();
    assert_eq!(after, before);
    assert!(!c.values().contains(keys::CARD_PIN));
}

#[tokio::test]
async fn test_unknown_keys_are_rejected() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Login), &vault, &store);
    c.load().await;

    assert!(matches!(
        c.set_field("login.favourite_colour", "blue").await,
        Err(EditError::UnknownField(_))
    ));
    assert!(matches!(
        c.set_field("custom_404", "x").await,
        Err(EditError::UnknownField(_))
    ));
}

// ----------------------------------------------------------------------------
// Custom fields
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_custom_keys_are_never_reused() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Login), &vault, &store);
    c.load().await;

    let first = c.add_custom_field("Recovery code", FieldType::Hidden).await.unwrap();
    c.set_field(&first, "abc").await.unwrap();
    c.remove_custom_field(&first).await.unwrap();
    let second = c.add_custom_field("Recovery code", FieldType::Hidden).await.unwrap();

    assert_ne!(first, second);
    assert!(!c.values().contains(&first));
    assert!(c.layout().keys().contains(&second.as_str()));
}

#[tokio::test]
async fn test_custom_fields_are_saved_with_labels() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Note), &vault, &store);
    c.load().await;

    let pin = c.add_custom_field("Door PIN", FieldType::Password).await.unwrap();
    let floor = c.add_custom_field("Floor", FieldType::Number).await.unwrap();
    c.set_field(&pin, "0000").await.unwrap();
    c.set_field(&floor, "4").await.unwrap();
    c.reorder_custom_field(&floor, 0).await.unwrap();
    c.relabel_custom_field(&floor, "Storey").await.unwrap();

    let id = saved_id(c.submit().await.unwrap());
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    let custom: Vec<(&str, &str, bool)> = saved
        .fields
        .iter()
        .map(|f| (f.field_key.as_str(), f.label.as_str(), f.is_hidden))
        .collect();
    assert_eq!(
        custom,
        vec![(floor.as_str(), "Storey", false), (pin.as_str(), "Door PIN", true)]
    );
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_restores_interrupted_create() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();

    let mut first = controller(create(ItemType::Login), &vault, &store);
    first.load().await;
    first.set_name("Forum").await.unwrap();
    first.set_field(keys::LOGIN_USERNAME, "alice").await.unwrap();
    let key = first.add_custom_field("Security answer", FieldType::Text).await.unwrap();
    first.set_field(&key, "Rex").await.unwrap();
    let expected = first.snapshot();
    drop(first);

    let mut second = controller(create(ItemType::Login), &vault, &store);
    second.load().await;

    assert_eq!(second.snapshot(), expected);
    assert_eq!(second.item().name, "Forum");
    assert_eq!(second.values().get_str(&key), "Rex");

    let next = second.add_custom_field("Another", FieldType::Text).await.unwrap();
    assert_ne!(next, key);
}

#[tokio::test]
async fn test_snapshot_for_other_item_is_ignored() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let a = seed(&vault, ItemType::Login, "A", vec![field(keys::LOGIN_USERNAME, FieldType::Text, "a")]).await;
    let b = seed(&vault, ItemType::Login, "B", vec![field(keys::LOGIN_USERNAME, FieldType::Text, "b")]).await;

    let mut editing_a = controller(EditTarget::Edit(a.clone()), &vault, &store);
    editing_a.load().await;
    editing_a.set_field(keys::LOGIN_USERNAME, "changed").await.unwrap();
    drop(editing_a);

    let mut editing_b = controller(EditTarget::Edit(b), &vault, &store);
    editing_b.load().await;
    assert_eq!(editing_b.values().get_str(keys::LOGIN_USERNAME), "b");

    let mut reopened_a = controller(EditTarget::Edit(a), &vault, &store);
    reopened_a.load().await;
    assert_eq!(reopened_a.values().get_str(keys::LOGIN_USERNAME), "changed");
}

#[tokio::test]
async fn test_load_does_not_write_snapshot() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(&vault, ItemType::Note, "Note", vec![field(keys::NOTES_CONTENT, FieldType::TextArea, "hi")]).await;

    let mut c = controller(EditTarget::Edit(id), &vault, &store);
    c.load().await;
    assert_eq!(store.write_count(), 0);
    assert!(c.session().sections.notes);

    c.set_name("Renamed").await.unwrap();
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_skip_restore_starts_fresh() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut first = controller(create(ItemType::Note), &vault, &store);
    first.load().await;
    first.set_name("Draft").await.unwrap();
    drop(first);

    let flag = SkipRestoreFlag::new();
    flag.set();
    let mut second = controller(create(ItemType::Note), &vault, &store).with_skip_restore(flag.clone());
    second.load().await;
    assert_eq!(second.item().name, "");
    assert!(!flag.take());
}

#[tokio::test]
async fn test_teardown_clears_snapshot() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Note), &vault, &store);
    c.load().await;
    c.set_name("Draft").await.unwrap();
    assert!(store.contents().is_some());

    c.teardown().await;
    assert_eq!(store.contents(), None);
}

// ----------------------------------------------------------------------------
// Email mode
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_email_mode_toggle_clears_and_regenerates() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;
    assert_eq!(c.email_mode(), FieldMode::Alias);

    assert_eq!(c.toggle_email_mode().await.unwrap(), FieldMode::FreeText);
    assert!(c.values().is_blank(keys::LOGIN_EMAIL));

    assert_eq!(c.toggle_email_mode().await.unwrap(), FieldMode::Alias);
    assert_eq!(c.values().get_str(keys::LOGIN_EMAIL), "alias2@mine.example");
}

#[tokio::test]
async fn test_typing_address_switches_to_free_text() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Alias), &vault, &store);
    c.load().await;

    c.set_field(keys::LOGIN_EMAIL, "me@gmail.com").await.unwrap();
    assert_eq!(c.email_mode(), FieldMode::FreeText);
    assert!(!c.session().generation.email_mode.user_overrode());

    // The user's address survives regeneration.
    c.generate_alias().await.unwrap();
    assert_eq!(c.values().get_str(keys::LOGIN_EMAIL), "me@gmail.com");
}

// ----------------------------------------------------------------------------
// Submit and delete
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_value_keeps_editing() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Login), &vault, &store);
    c.load().await;
    c.set_field(keys::LOGIN_EMAIL, "not an email").await.unwrap();

    match c.submit().await {
        Err(EditError::Validation { key, .. }) => assert_eq!(key, keys::LOGIN_EMAIL),
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(c.state(), ControllerState::Editing);
}

#[tokio::test]
async fn test_save_failure_allows_retry() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Note), &vault, &store);
    c.load().await;
    c.set_field(keys::NOTES_CONTENT, "keep me").await.unwrap();

    vault.set_read_only(true);
    assert!(matches!(c.submit().await, Err(EditError::Save(_))));
    assert_eq!(c.state(), ControllerState::Editing);
    assert!(store.contents().is_some());

    vault.set_read_only(false);
    let id = saved_id(c.submit().await.unwrap());
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(
        saved.field(keys::NOTES_CONTENT).map(|f| f.value.clone()),
        Some(FieldValue::from("keep me"))
    );
}

#[tokio::test]
async fn test_missing_item_navigates_to_list() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(EditTarget::Edit("missing".into()), &vault, &store);

    assert_eq!(c.load().await, Navigation::ToList);
    assert_eq!(c.state(), ControllerState::Done);
    assert!(matches!(
        c.set_name("x").await,
        Err(EditError::InvalidState { operation: "set_name", .. })
    ));
}

#[tokio::test]
async fn test_delete_requires_confirmation() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(&vault, ItemType::Note, "Old", Vec::new()).await;
    let mut c = controller(EditTarget::Edit(id.clone()), &vault, &store);
    c.load().await;

    assert_eq!(c.delete(&AutoConfirm(false)).await.unwrap(), Navigation::Stay);
    assert!(vault.get_item_by_id(&id).await.unwrap().is_some());

    assert_eq!(c.delete(&AutoConfirm(true)).await.unwrap(), Navigation::ToList);
    assert!(vault.get_item_by_id(&id).await.unwrap().is_none());
    assert_eq!(c.state(), ControllerState::Done);
}

#[tokio::test]
async fn test_delete_failure_keeps_editing() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let id = seed(&vault, ItemType::Note, "Old", Vec::new()).await;
    let mut c = controller(EditTarget::Edit(id), &vault, &store);
    c.load().await;

    vault.set_read_only(true);
    assert!(matches!(c.delete(&AutoConfirm(true)).await, Err(EditError::Delete(_))));
    assert_eq!(c.state(), ControllerState::Editing);
}

#[tokio::test]
async fn test_delete_in_create_mode_is_rejected() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut c = controller(create(ItemType::Note), &vault, &store);
    c.load().await;
    assert!(matches!(
        c.delete(&AutoConfirm(true)).await,
        Err(EditError::InvalidState { operation: "delete", .. })
    ));
}

#[tokio::test]
async fn test_favicon_is_attached_on_submit() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut opts = options();
    opts.fetch_favicons = true;
    let mut c = controller_with(create(ItemType::Login), &vault, &store, FixedFavicon, opts);
    c.load().await;
    c.set_field(keys::LOGIN_URL, "example.com").await.unwrap();

    let id = saved_id(c.submit().await.unwrap());
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(saved.logo.as_deref(), Some("aWNvbg=="));
}

#[tokio::test(start_paused = true)]
async fn test_slow_favicon_does_not_block_save() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut opts = options();
    opts.fetch_favicons = true;
    let mut c = controller_with(create(ItemType::Login), &vault, &store, HangingFavicon, opts);
    c.load().await;
    c.set_field(keys::LOGIN_URL, "example.com").await.unwrap();

    let id = saved_id(c.submit().await.unwrap());
    let saved = vault.get_item_by_id(&id).await.unwrap().unwrap();
    assert_eq!(saved.logo, None);
}

#[tokio::test]
async fn test_related_records_round_trip_through_update() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let mut item = Item::new(ItemType::Login);
    item.name = "With files".into();
    let id = vault
        .create_item(
            item,
            vec![Attachment {
                id: String::new(),
                filename: "recovery.txt".into(),
                blob: b"codes".to_vec(),
            }],
            Vec::new(),
        )
        .await
        .unwrap();

    let mut c = controller(EditTarget::Edit(id.clone()), &vault, &store);
    c.load().await;
    assert!(c.session().sections.attachments);
    let existing = c.session().attachments[0].id.clone();
    c.remove_attachment(&existing).await.unwrap();
    c.add_totp_code("main", "JBSWY3DPEHPK3PXP").await.unwrap();
    c.submit().await.unwrap();

    assert!(vault.get_attachments_for_item(&id).await.unwrap().is_empty());
    let codes = vault.get_totp_codes_for_item(&id).await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].name, "main");
}

#[tokio::test]
async fn test_folder_must_exist() {
    let vault = MemoryVault::new();
    let store = MemorySnapshotStore::new();
    let work = vault.add_folder("Work").unwrap();
    let mut c = controller(create(ItemType::Note), &vault, &store);
    c.load().await;

    assert!(matches!(
        c.set_folder(Some("nope")).await,
        Err(EditError::UnknownFolder(_))
    ));
    c.set_folder(Some(&work.id)).await.unwrap();
    assert_eq!(c.item().folder_id.as_deref(), Some(work.id.as_str()));
}
