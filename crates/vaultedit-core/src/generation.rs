//! Alias generation with a non-destructive overwrite policy.
//!
//! Identity and password generators are opaque collaborators produced by a
//! [`GeneratorFactory`] from the vault settings. The coordinator decides
//! which of their outputs may replace what is in the value store: email,
//! username and password are only replaced while they are empty or still
//! hold the value the previous generation wrote.

use crate::error::{EditError, EditResult};
use crate::models::{AgeRange, BirthdateOptions, GenderPreference, Identity, PasswordSettings};
use crate::registry::keys;
use crate::store::FieldValueStore;
use anyhow::{bail, Context};
use chrono::{Duration, Months, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Produces random identities.
pub trait IdentityGenerator {
    fn generate_random_identity(
        &self,
        gender: GenderPreference,
        birthdate: &BirthdateOptions,
    ) -> anyhow::Result<Identity>;
}

/// Produces random passwords.
pub trait PasswordGenerator {
    fn generate_random_password(&self) -> anyhow::Result<String>;
}

/// Builds generators configured from vault settings.
pub trait GeneratorFactory: Send + Sync {
    fn identity_generator(&self, language: &str) -> Box<dyn IdentityGenerator>;
    fn password_generator(&self, settings: &PasswordSettings) -> Box<dyn PasswordGenerator>;
}

/// Fields whose generated value is tracked in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedField {
    Email,
    Username,
    Password,
}

impl GeneratedField {
    pub fn key(self) -> &'static str {
        match self {
            GeneratedField::Email => keys::LOGIN_EMAIL,
            GeneratedField::Username => keys::LOGIN_USERNAME,
            GeneratedField::Password => keys::LOGIN_PASSWORD,
        }
    }
}

/// Last value written by generation, per tracked field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationLedger {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GenerationLedger {
    pub fn get(&self, field: GeneratedField) -> Option<&str> {
        match field {
            GeneratedField::Email => self.email.as_deref(),
            GeneratedField::Username => self.username.as_deref(),
            GeneratedField::Password => self.password.as_deref(),
        }
    }

    pub fn record(&mut self, field: GeneratedField, value: impl Into<String>) {
        let slot = match field {
            GeneratedField::Email => &mut self.email,
            GeneratedField::Username => &mut self.username,
            GeneratedField::Password => &mut self.password,
        };
        *slot = Some(value.into());
    }

    /// Whether the store's current value for `field` may be replaced.
    pub fn may_overwrite(&self, field: GeneratedField, current: &str) -> bool {
        current.trim().is_empty() || self.get(field) == Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.username.is_none() && self.password.is_none()
    }
}

/// Generation inputs read from the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub language: String,
    pub gender: GenderPreference,
    pub age_range: AgeRange,
    pub password: PasswordSettings,
    /// Domain for the alias email. No email is generated without one.
    pub email_domain: Option<String>,
    pub today: NaiveDate,
}

/// What a generation run produced and which tracked fields it wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAlias {
    pub identity: Identity,
    pub email: Option<String>,
    pub username: String,
    pub password: String,
    pub written: Vec<GeneratedField>,
}

/// Runs generators and applies their output to the value store.
pub struct GenerationCoordinator<'a> {
    factory: &'a dyn GeneratorFactory,
}

impl<'a> GenerationCoordinator<'a> {
    pub fn new(factory: &'a dyn GeneratorFactory) -> Self {
        Self { factory }
    }

    /// Generate a full alias into `store`, updating `ledger`.
    ///
    /// An identity generator failure leaves the store untouched. A password
    /// generator failure falls back to a locally generated password.
    pub fn generate_alias(
        &self,
        settings: &GenerationSettings,
        store: &mut FieldValueStore,
        ledger: &mut GenerationLedger,
    ) -> EditResult<GeneratedAlias> {
        let identity = self
            .factory
            .identity_generator(&settings.language)
            .generate_random_identity(
                settings.gender,
                &BirthdateOptions {
                    age_range: settings.age_range,
                    today: settings.today,
                },
            )
            .map_err(|e| {
                tracing::error!("Identity generation failed: {:#}", e);
                EditError::Generation(e.to_string())
            })?;

        let password = match self
            .factory
            .password_generator(&settings.password)
            .generate_random_password()
        {
            Ok(password) => password,
            Err(e) => {
                tracing::warn!("Password generation failed, using local fallback: {:#}", e);
                fallback_password(settings.password.length)
            }
        };

        // Identity fields have no user-typed signal of their own.
        store.set(keys::ALIAS_FIRST_NAME, identity.first_name.as_str());
        store.set(keys::ALIAS_LAST_NAME, identity.last_name.as_str());
        store.set(keys::ALIAS_NICKNAME, identity.nick_name.as_str());
        store.set(keys::ALIAS_GENDER, identity.gender.to_string());
        store.set(
            keys::ALIAS_BIRTHDATE,
            identity.birth_date.format("%Y-%m-%d").to_string(),
        );

        let email = settings
            .email_domain
            .as_deref()
            .map(|domain| crate::field_mode::compose(&identity.email_prefix, domain));
        let username = identity.nick_name.clone();

        let mut written = Vec::new();
        let mut tracked = vec![
            (GeneratedField::Username, username.clone()),
            (GeneratedField::Password, password.clone()),
        ];
        if let Some(email) = &email {
            tracked.insert(0, (GeneratedField::Email, email.clone()));
        }
        for (field, value) in tracked {
            if ledger.may_overwrite(field, store.get_str(field.key())) {
                store.set(field.key(), value.as_str());
                ledger.record(field, value);
                written.push(field);
            } else {
                tracing::debug!("Keeping user value for {}", field.key());
            }
        }

        tracing::info!("Generated alias identity ({} tracked fields written)", written.len());
        Ok(GeneratedAlias {
            identity,
            email,
            username,
            password,
            written,
        })
    }
}

/// Password built from the thread RNG when the configured generator fails.
pub fn fallback_password(length: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let length = length.max(12);
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

// ----------------------------------------------------------------------------
// Reference generators
// ----------------------------------------------------------------------------

struct NameList {
    male: &'static [&'static str],
    female: &'static [&'static str],
    last: &'static [&'static str],
}

const EN_NAMES: NameList = NameList {
    male: &["James", "Oliver", "Henry", "Lucas", "Noah", "Samuel", "Owen", "Leo"],
    female: &["Emma", "Olivia", "Ava", "Grace", "Chloe", "Lily", "Ruby", "Nora"],
    last: &["Smith", "Turner", "Walker", "Hughes", "Bennett", "Parker", "Morgan", "Reed"],
};

const NL_NAMES: NameList = NameList {
    male: &["Daan", "Sem", "Lars", "Bram", "Thijs", "Jesse", "Ruben", "Joris"],
    female: &["Sanne", "Lotte", "Femke", "Anouk", "Iris", "Fleur", "Noor", "Esmee"],
    last: &["de Jong", "Jansen", "Visser", "Bakker", "Smit", "Meijer", "Mulder", "Bos"],
};

/// Identity generator drawing from built-in name lists.
#[derive(Debug, Clone)]
pub struct RandomIdentityGenerator {
    language: String,
}

impl RandomIdentityGenerator {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn names(&self) -> &'static NameList {
        match self.language.as_str() {
            "nl" => &NL_NAMES,
            _ => &EN_NAMES,
        }
    }
}

impl IdentityGenerator for RandomIdentityGenerator {
    fn generate_random_identity(
        &self,
        gender: GenderPreference,
        birthdate: &BirthdateOptions,
    ) -> anyhow::Result<Identity> {
        use crate::models::Gender;

        let mut rng = rand::thread_rng();
        let gender = match gender {
            GenderPreference::Male => Gender::Male,
            GenderPreference::Female => Gender::Female,
            GenderPreference::Random if rng.gen_bool(0.5) => Gender::Male,
            GenderPreference::Random => Gender::Female,
        };
        let names = self.names();
        let first_pool = match gender {
            Gender::Male => names.male,
            Gender::Female => names.female,
        };
        let first_name: &str = first_pool.choose(&mut rng).copied().context("empty name list")?;
        let last_name: &str = names.last.choose(&mut rng).copied().context("empty name list")?;

        let AgeRange { min, max } = birthdate.age_range;
        if min > max {
            bail!("invalid age range {min}-{max}");
        }
        let months = |years: u32| {
            years
                .checked_mul(12)
                .map(Months::new)
                .with_context(|| format!("age range {min}-{max} is too large"))
        };
        let oldest = max
            .checked_add(1)
            .with_context(|| format!("age range {min}-{max} is too large"))?;
        let earliest = birthdate
            .today
            .checked_sub_months(months(oldest)?)
            .context("age range out of calendar bounds")?
            + Duration::days(1);
        let latest = birthdate
            .today
            .checked_sub_months(months(min)?)
            .context("age range out of calendar bounds")?;
        let span = (latest - earliest).num_days().max(0);
        let birth_date = earliest + Duration::days(rng.gen_range(0..=span));

        let slug = |s: &str| -> String {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        };
        let suffix: u8 = rng.gen_range(10..100);
        let nick_name = format!("{}{}{}", slug(first_name), slug(last_name), suffix);
        let email_prefix = format!("{}.{}{}", slug(first_name), slug(last_name), suffix);

        Ok(Identity {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            nick_name,
            gender,
            birth_date,
            email_prefix,
        })
    }
}

/// Password generator honouring [`PasswordSettings`].
#[derive(Debug, Clone)]
pub struct RandomPasswordGenerator {
    settings: PasswordSettings,
}

impl RandomPasswordGenerator {
    pub fn new(settings: PasswordSettings) -> Self {
        Self { settings }
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate_random_password(&self) -> anyhow::Result<String> {
        const AMBIGUOUS: &str = "Il1O0o";
        let s = &self.settings;
        let classes: Vec<&str> = [
            (s.use_lowercase, "abcdefghijklmnopqrstuvwxyz"),
            (s.use_uppercase, "ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            (s.use_numbers, "0123456789"),
            (s.use_special_chars, "!@#$%^&*()-_=+[]{};:,.?"),
        ]
        .into_iter()
        .filter_map(|(enabled, chars)| enabled.then_some(chars))
        .collect();

        if classes.is_empty() {
            bail!("password settings enable no character classes");
        }
        if s.length < classes.len() {
            bail!("password length {} is shorter than the enabled classes", s.length);
        }

        let pools: Vec<Vec<char>> = classes
            .iter()
            .map(|class| {
                class
                    .chars()
                    .filter(|c| !s.use_non_ambiguous_chars || !AMBIGUOUS.contains(*c))
                    .collect()
            })
            .collect();
        let all: Vec<char> = pools.iter().flatten().copied().collect();

        let mut rng = rand::thread_rng();
        // One character from every enabled class, the rest from the union.
        let mut chars: Vec<char> = pools
            .iter()
            .filter_map(|pool| pool.choose(&mut rng).copied())
            .collect();
        while chars.len() < s.length {
            chars.push(*all.choose(&mut rng).context("empty character pool")?);
        }
        chars.shuffle(&mut rng);
        Ok(chars.into_iter().collect())
    }
}

/// Factory for the reference generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGeneratorFactory;

impl GeneratorFactory for RandomGeneratorFactory {
    fn identity_generator(&self, language: &str) -> Box<dyn IdentityGenerator> {
        Box::new(RandomIdentityGenerator::new(language))
    }

    fn password_generator(&self, settings: &PasswordSettings) -> Box<dyn PasswordGenerator> {
        Box::new(RandomPasswordGenerator::new(settings.clone()))
    }
}
