//! Render mode for dual-mode fields such as the login email.
//!
//! In alias mode the editor shows a local part plus a domain picker fed by
//! the vault's known domains; in free-text mode it shows a plain input. The
//! machine infers the mode for pre-filled values without overriding a mode
//! the user picked explicitly.

use serde::{Deserialize, Serialize};

/// How a dual-mode field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMode {
    Alias,
    FreeText,
}

/// Follow-up the caller must perform after a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    None,
    /// Entering alias mode: generate a fresh alias address.
    Regenerate,
    /// Entering free-text mode: clear the value for free entry.
    ClearValue,
}

/// Email domains the vault can receive mail on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDomains {
    pub public: Vec<String>,
    pub private: Vec<String>,
}

impl KnownDomains {
    pub fn new(public: Vec<String>, private: Vec<String>) -> Self {
        Self { public, private }
    }

    pub fn contains(&self, domain: &str) -> bool {
        let domain = domain.trim();
        self.public
            .iter()
            .chain(self.private.iter())
            .any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Domain used for newly generated aliases. Private domains win.
    pub fn default_domain(&self) -> Option<&str> {
        self.private
            .first()
            .or_else(|| self.public.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }
}

/// Split an address into local part and domain.
pub fn split(value: &str) -> (&str, Option<&str>) {
    match value.rsplit_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (value, None),
    }
}

/// Join a local part and domain.
pub fn compose(local: &str, domain: &str) -> String {
    format!("{}@{}", local.trim(), domain.trim())
}

/// Mode state machine for one dual-mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModeResolver {
    mode: FieldMode,
    user_overrode: bool,
}

impl FieldModeResolver {
    pub fn new(mode: FieldMode) -> Self {
        Self {
            mode,
            user_overrode: false,
        }
    }

    /// Initial mode for a field arriving with `value`.
    ///
    /// Empty values start in alias mode when any domain is known; values on a
    /// known domain start in alias mode; anything else is free text.
    pub fn initial_for(value: &str, domains: &KnownDomains) -> Self {
        let mode = match split(value.trim()) {
            ("", None) if !domains.is_empty() => FieldMode::Alias,
            (_, Some(domain)) if domains.contains(domain) => FieldMode::Alias,
            _ => FieldMode::FreeText,
        };
        Self::new(mode)
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn user_overrode(&self) -> bool {
        self.user_overrode
    }

    /// Explicit mode choice by the user.
    pub fn set_mode(&mut self, mode: FieldMode) -> ModeAction {
        self.user_overrode = true;
        if self.mode == mode {
            return ModeAction::None;
        }
        self.mode = mode;
        match mode {
            FieldMode::Alias => ModeAction::Regenerate,
            FieldMode::FreeText => ModeAction::ClearValue,
        }
    }

    /// Explicit toggle by the user.
    pub fn toggle(&mut self) -> ModeAction {
        let next = match self.mode {
            FieldMode::Alias => FieldMode::FreeText,
            FieldMode::FreeText => FieldMode::Alias,
        };
        self.set_mode(next)
    }

    /// The user typed `value`. A literal `@` in alias mode means a full
    /// address is being entered.
    pub fn on_input(&mut self, value: &str) {
        if self.mode == FieldMode::Alias && value.contains('@') {
            tracing::debug!("Address typed in alias mode, switching to free text");
            self.mode = FieldMode::FreeText;
        }
    }

    /// Re-evaluate a value that arrived without typing (load, restore,
    /// generation). Switches to alias mode on a known domain unless the user
    /// chose a mode explicitly.
    pub fn detect(&mut self, value: &str, domains: &KnownDomains) {
        if self.user_overrode {
            return;
        }
        if let (_, Some(domain)) = split(value.trim()) {
            if domains.contains(domain) {
                self.mode = FieldMode::Alias;
            }
        }
    }
}
