//! vaultedit - add and edit vault items from the terminal
//!
//! Every `new`/`edit` run is one edit session. Use `--draft` to leave it
//! open; the next run with the same target resumes it.

mod app;
mod config;
mod handlers;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultedit_core::{AutoConfirm, ItemType, VaultCollaborator};

use app::App;
use config::Config;
use handlers::{EditArgs, StdinConfirmation};

/// vaultedit - add and edit vault items
#[derive(Parser, Debug)]
#[command(name = "vaultedit")]
#[command(about = "Add and edit vault items with resumable edit sessions")]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored items
    List,
    /// List the fields an item type can have
    Fields {
        #[arg(long = "type", value_name = "TYPE")]
        item_type: ItemType,
    },
    /// Create an item
    New {
        #[arg(long = "type", value_name = "TYPE")]
        item_type: ItemType,
        /// Page the item is for; fills in the URL and name
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        edits: EditArgs,
    },
    /// Edit an existing item
    Edit {
        id: String,
        /// Change the item type
        #[arg(long = "type", value_name = "TYPE")]
        item_type: Option<ItemType>,
        #[command(flatten)]
        edits: EditArgs,
    },
    /// Print an item
    Show { id: String },
    /// Delete an item
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Drop the in-progress edit
    Discard,
    /// Change a vault setting
    Set { key: String, value: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::from_filename(".env.dev").ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vaultedit=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config)?;
    let app = App::new(config)?;
    tracing::debug!("Using vault {}", app.vault.path().display());

    let mut out = std::io::stdout().lock();
    match args.command {
        Command::List => {
            for item in app.vault.items()? {
                writeln!(out, "{}  {:<12} {}", item.id, item.item_type, item.name)?;
            }
        }
        Command::Fields { item_type } => handlers::list_fields(item_type, &mut out)?,
        Command::New {
            item_type,
            url,
            edits,
        } => handlers::new_item(&app, item_type, url, &edits, &mut out).await?,
        Command::Edit {
            id,
            item_type,
            edits,
        } => handlers::edit_item(&app, &id, item_type, &edits, &mut out).await?,
        Command::Show { id } => handlers::show_item(&app, &id, &mut out).await?,
        Command::Delete { id, yes } => {
            if yes {
                handlers::delete_item(&app, &id, &AutoConfirm(true), &mut out).await?
            } else {
                handlers::delete_item(&app, &id, &StdinConfirmation, &mut out).await?
            }
        }
        Command::Discard => handlers::discard(&app, &mut out).await?,
        Command::Set { key, value } => {
            app.vault.update_setting(&key, &value).await?;
            writeln!(out, "{key} = {value}")?;
        }
    }
    Ok(())
}
