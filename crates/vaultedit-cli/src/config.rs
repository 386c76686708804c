//! Configuration file handling.
//!
//! Reads from `~/.config/vaultedit/vaultedit.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultedit_core::{ControllerOptions, KnownDomains};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the JSON vault file.
    #[serde(default = "default_vault_path")]
    pub vault_path: PathBuf,
    /// Where the in-progress edit is kept between runs.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Whether to look up a favicon when saving a login.
    #[serde(default = "default_fetch_favicons")]
    pub fetch_favicons: bool,
    /// How long a favicon lookup may delay a save.
    #[serde(default = "default_favicon_timeout_ms")]
    pub favicon_timeout_ms: u64,
    /// Minimum interval between snapshot writes.
    #[serde(default)]
    pub snapshot_debounce_ms: u64,
    /// Shared alias domains.
    #[serde(default = "default_public_email_domains")]
    pub public_email_domains: Vec<String>,
    /// Alias domains owned by the user. Preferred for new aliases.
    #[serde(default)]
    pub private_email_domains: Vec<String>,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultedit")
}

fn default_vault_path() -> PathBuf {
    data_dir().join("vault.json")
}

fn default_snapshot_path() -> PathBuf {
    data_dir().join("edit-snapshot.json")
}

fn default_fetch_favicons() -> bool {
    true
}

fn default_favicon_timeout_ms() -> u64 {
    3000
}

fn default_public_email_domains() -> Vec<String> {
    vec!["spamok.com".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            snapshot_path: default_snapshot_path(),
            fetch_favicons: default_fetch_favicons(),
            favicon_timeout_ms: default_favicon_timeout_ms(),
            snapshot_debounce_ms: 0,
            public_email_domains: default_public_email_domains(),
            private_email_domains: Vec::new(),
        }
    }
}

impl Config {
    /// Load `vaultedit.toml`.
    ///
    /// An explicit `--config` path must exist. Without one the file lives in
    /// `vaultedit/` under the platform config dir and is written with
    /// defaults on first run; the vault and draft snapshot default to the
    /// matching data dir.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match custom_path {
            Some(path) if path.exists() => path,
            Some(path) => anyhow::bail!("Config file not found: {}", path.display()),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    let config = Config::default();
                    config.save(&path)?;
                    tracing::info!(
                        "Wrote default config to {} (vault at {})",
                        path.display(),
                        config.vault_path.display()
                    );
                    return Ok(config);
                }
                path
            }
        };

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::debug!("Loaded config from {}: {:?}", config_path.display(), config);
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Options for edit sessions started from this config.
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            fetch_favicons: self.fetch_favicons,
            favicon_timeout: Duration::from_millis(self.favicon_timeout_ms),
            domains: KnownDomains::new(
                self.public_email_domains.clone(),
                self.private_email_domains.clone(),
            ),
            debounce: Duration::from_millis(self.snapshot_debounce_ms),
        }
    }

    /// `<config dir>/vaultedit/vaultedit.toml`
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("vaultedit").join("vaultedit.toml"))
    }
}
