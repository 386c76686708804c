//! Command handlers.

use crate::app::{App, Controller};
use anyhow::{bail, Context, Result};
use std::io::Write;
use vaultedit_core::registry::is_custom_key;
use vaultedit_core::{
    Confirmation, EditTarget, FieldRegistry, FieldType, FieldValue, Item, ItemType, Navigation,
    SnapshotStore, VaultCollaborator,
};

/// Edits shared by `new` and `edit`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Item name
    #[arg(long)]
    pub name: Option<String>,

    /// Set a field; repeat a multi-value key to add entries
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Remove a field and its value
    #[arg(long = "remove", value_name = "KEY")]
    pub remove: Vec<String>,

    /// Set a custom field, creating it when no field has that label
    #[arg(long = "custom", value_name = "LABEL[:TYPE]=VALUE")]
    pub custom: Vec<String>,

    /// Folder name; created when missing
    #[arg(long)]
    pub folder: Option<String>,

    /// Generate a new alias identity
    #[arg(long)]
    pub generate: bool,

    /// Keep the edit as a draft instead of saving
    #[arg(long)]
    pub draft: bool,
}

/// Asks on stdin before deleting.
pub struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm_delete(&self, item: &Item) -> bool {
        eprint!("Delete '{}'? [y/N] ", item.name);
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Print the field catalog for a type.
pub fn list_fields(item_type: ItemType, out: &mut impl Write) -> Result<()> {
    let registry = FieldRegistry::builtin();
    for def in registry.fields_for(item_type) {
        let shown = if registry.shown_by_default(def, item_type) {
            "shown"
        } else {
            "optional"
        };
        let multi = if def.is_multi_value { " (multi)" } else { "" };
        writeln!(
            out,
            "{:<22} {:<10} {:<10} {}{}",
            def.field_key,
            format!("{:?}", def.category),
            format!("{:?}", def.field_type),
            shown,
            multi
        )?;
    }
    Ok(())
}

pub async fn new_item(
    app: &App,
    item_type: ItemType,
    url: Option<String>,
    edits: &EditArgs,
    out: &mut impl Write,
) -> Result<()> {
    ensure_folder(app, edits).await?;
    let mut controller = app.controller(EditTarget::Create {
        item_type,
        service_url: url,
    });
    if controller.load().await != Navigation::Stay {
        bail!("Could not start a new {item_type} item");
    }
    let requested = (controller.session().item_type() != item_type).then_some(item_type);
    run_session(app, &mut controller, requested, edits, out).await
}

pub async fn edit_item(
    app: &App,
    id: &str,
    new_type: Option<ItemType>,
    edits: &EditArgs,
    out: &mut impl Write,
) -> Result<()> {
    ensure_folder(app, edits).await?;
    let mut controller = app.controller(EditTarget::Edit(id.to_string()));
    if controller.load().await != Navigation::Stay {
        bail!("Could not open item {id}");
    }
    run_session(app, &mut controller, new_type, edits, out).await
}

/// Apply the edits and save. A failed run drops the session unless it was
/// started as a draft.
async fn run_session(
    app: &App,
    controller: &mut Controller,
    new_type: Option<ItemType>,
    edits: &EditArgs,
    out: &mut impl Write,
) -> Result<()> {
    let result = edit_and_finish(app, controller, new_type, edits, out).await;
    if result.is_err() && !edits.draft {
        controller.teardown().await;
    }
    result
}

async fn edit_and_finish(
    app: &App,
    controller: &mut Controller,
    new_type: Option<ItemType>,
    edits: &EditArgs,
    out: &mut impl Write,
) -> Result<()> {
    if let Some(item_type) = new_type {
        controller.change_type(item_type).await?;
    }
    apply_edits(app, controller, edits).await?;
    finish(app, controller, edits.draft, out).await
}

pub async fn show_item(app: &App, id: &str, out: &mut impl Write) -> Result<()> {
    let item = app
        .vault
        .get_item_by_id(id)
        .await?
        .with_context(|| format!("Item not found: {id}"))?;
    print_item(&item, out)?;

    let attachments = app.vault.get_attachments_for_item(id).await?;
    for attachment in &attachments {
        writeln!(out, "  attachment: {} ({} bytes)", attachment.filename, attachment.blob.len())?;
    }
    let codes = app.vault.get_totp_codes_for_item(id).await?;
    for code in &codes {
        writeln!(out, "  totp: {}", code.name)?;
    }
    Ok(())
}

pub async fn delete_item(
    app: &App,
    id: &str,
    confirmation: &dyn Confirmation,
    out: &mut impl Write,
) -> Result<()> {
    let mut controller = app.controller(EditTarget::Edit(id.to_string()));
    if controller.load().await != Navigation::Stay {
        bail!("Could not open item {id}");
    }
    match controller.delete(confirmation).await? {
        Navigation::ToList => writeln!(out, "Deleted {id}")?,
        _ => writeln!(out, "Cancelled")?,
    }
    Ok(())
}

/// Drop the in-progress edit, if any.
pub async fn discard(app: &App, out: &mut impl Write) -> Result<()> {
    app.snapshot_store().clear().await?;
    writeln!(out, "Discarded in-progress edit")?;
    Ok(())
}

async fn apply_edits(app: &App, controller: &mut Controller, edits: &EditArgs) -> Result<()> {
    if let Some(name) = &edits.name {
        controller.set_name(name.as_str()).await?;
    }

    for key in &edits.remove {
        if is_custom_key(key) {
            controller.remove_custom_field(key).await?;
        } else {
            controller.remove_field(key).await?;
        }
    }

    for (key, values) in group_assignments(&edits.set)? {
        let multi = controller
            .registry()
            .get(&key)
            .is_some_and(|def| def.is_multi_value);
        let value = if multi {
            FieldValue::Multi(values)
        } else {
            FieldValue::Single(values.into_iter().last().unwrap_or_default())
        };
        controller
            .set_field(&key, value)
            .await
            .with_context(|| format!("Failed to set {key}"))?;
    }

    for arg in &edits.custom {
        let (label, field_type, value) = parse_custom(arg)?;
        let existing = controller
            .session()
            .custom_fields
            .fields()
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.temp_id.clone());
        let key = match existing {
            Some(key) => key,
            None => controller.add_custom_field(label.as_str(), field_type).await?,
        };
        controller.set_field(&key, value.as_str()).await?;
    }

    if let Some(folder) = &edits.folder {
        let id = folder_id(controller, folder)?;
        controller.set_folder(Some(&id)).await?;
    }

    if edits.generate {
        let generated = controller.generate_alias().await?;
        tracing::info!(
            "Generated identity {} {}",
            generated.identity.first_name,
            generated.identity.last_name
        );
    }
    Ok(())
}

/// Create the requested folder up front so the controller sees it on load.
async fn ensure_folder(app: &App, edits: &EditArgs) -> Result<()> {
    let Some(folder) = &edits.folder else {
        return Ok(());
    };
    let folders = app.vault.get_all_folders().await?;
    if !folders.iter().any(|f| f.name == *folder || f.id == *folder) {
        app.vault.add_folder(folder)?;
    }
    Ok(())
}

fn folder_id(controller: &Controller, folder: &str) -> Result<String> {
    controller
        .folders()
        .iter()
        .find(|f| f.name == folder || f.id == folder)
        .map(|f| f.id.clone())
        .with_context(|| format!("Unknown folder: {folder}"))
}

async fn finish(app: &App, controller: &mut Controller, draft: bool, out: &mut impl Write) -> Result<()> {
    if draft {
        controller.flush().await?;
        writeln!(out, "Draft kept; run the same command again to resume it")?;
        return Ok(());
    }

    match controller.submit().await? {
        Navigation::ToItem(id) => {
            writeln!(out, "Saved {id}")?;
            show_item(app, &id, out).await
        }
        _ => Ok(()),
    }
}

fn print_item(item: &Item, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{} ({})", item.name, item.item_type)?;
    writeln!(out, "  id: {}", item.id)?;
    if let Some(folder) = &item.folder_id {
        writeln!(out, "  folder: {folder}")?;
    }
    for field in &item.fields {
        let value = if field.is_hidden {
            "********".to_string()
        } else {
            field.value.values().join(", ")
        };
        writeln!(out, "  {}: {}", field.label, value)?;
    }
    if item.logo.is_some() {
        writeln!(out, "  logo: yes")?;
    }
    Ok(())
}

/// Split `KEY=VALUE`.
pub fn parse_assignment(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{arg}'"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("Missing key in '{arg}'");
    }
    Ok((key.to_string(), value.to_string()))
}

/// Group repeated keys, keeping first-seen order.
pub fn group_assignments(args: &[String]) -> Result<Vec<(String, Vec<String>)>> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for arg in args {
        let (key, value) = parse_assignment(arg)?;
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => grouped.push((key, vec![value])),
        }
    }
    Ok(grouped)
}

/// Parse `LABEL[:TYPE]=VALUE`.
pub fn parse_custom(arg: &str) -> Result<(String, FieldType, String)> {
    let (lhs, value) = parse_assignment(arg)?;
    if let Some((label, type_name)) = lhs.rsplit_once(':') {
        if let Ok(field_type) = type_name.trim().parse::<FieldType>() {
            return Ok((label.trim().to_string(), field_type, value));
        }
    }
    Ok((lhs, FieldType::Text, value))
}
