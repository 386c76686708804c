//! Field types and their capability table.
//!
//! Every [`FieldType`] maps to exactly one [`FieldTypeCapability`] entry,
//! so adding a type means adding a row here rather than another `match`
//! arm in every consumer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

/// How a field's value is entered and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Password,
    Hidden,
    Email,
    #[serde(rename = "URL")]
    Url,
    Phone,
    Number,
    Date,
    TextArea,
}

/// Presentation hint for the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    SingleLine,
    Masked,
    MultiLine,
    Email,
    Url,
    Telephone,
    Numeric,
    Date,
}

/// Behaviour attached to a field type.
#[derive(Debug, Clone, Copy)]
pub struct FieldTypeCapability {
    /// Checks a non-empty value. Returns a human-readable reason on rejection.
    pub validate: fn(&str) -> Result<(), String>,
    /// Normalizes a value before it is written to the item.
    pub serialize: fn(&str) -> String,
    pub render_hint: RenderHint,
}

static CAPABILITIES: [FieldTypeCapability; 9] = [
    // Text
    FieldTypeCapability {
        validate: accept_any,
        serialize: trimmed,
        render_hint: RenderHint::SingleLine,
    },
    // Password
    FieldTypeCapability {
        validate: accept_any,
        serialize: verbatim,
        render_hint: RenderHint::Masked,
    },
    // Hidden
    FieldTypeCapability {
        validate: accept_any,
        serialize: verbatim,
        render_hint: RenderHint::Masked,
    },
    // Email
    FieldTypeCapability {
        validate: validate_email,
        serialize: trimmed,
        render_hint: RenderHint::Email,
    },
    // Url
    FieldTypeCapability {
        validate: validate_url,
        serialize: trimmed,
        render_hint: RenderHint::Url,
    },
    // Phone
    FieldTypeCapability {
        validate: validate_phone,
        serialize: trimmed,
        render_hint: RenderHint::Telephone,
    },
    // Number
    FieldTypeCapability {
        validate: validate_number,
        serialize: digits_only,
        render_hint: RenderHint::Numeric,
    },
    // Date
    FieldTypeCapability {
        validate: validate_date,
        serialize: trimmed,
        render_hint: RenderHint::Date,
    },
    // TextArea
    FieldTypeCapability {
        validate: accept_any,
        serialize: verbatim,
        render_hint: RenderHint::MultiLine,
    },
];

impl FieldType {
    /// All field types, in table order.
    pub const ALL: [FieldType; 9] = [
        FieldType::Text,
        FieldType::Password,
        FieldType::Hidden,
        FieldType::Email,
        FieldType::Url,
        FieldType::Phone,
        FieldType::Number,
        FieldType::Date,
        FieldType::TextArea,
    ];

    fn index(self) -> usize {
        match self {
            FieldType::Text => 0,
            FieldType::Password => 1,
            FieldType::Hidden => 2,
            FieldType::Email => 3,
            FieldType::Url => 4,
            FieldType::Phone => 5,
            FieldType::Number => 6,
            FieldType::Date => 7,
            FieldType::TextArea => 8,
        }
    }

    /// The capability entry for this type.
    pub fn capability(self) -> &'static FieldTypeCapability {
        &CAPABILITIES[self.index()]
    }

    pub fn validate(self, value: &str) -> Result<(), String> {
        (self.capability().validate)(value)
    }

    pub fn serialize(self, value: &str) -> String {
        (self.capability().serialize)(value)
    }

    pub fn render_hint(self) -> RenderHint {
        self.capability().render_hint
    }

    /// Whether values of this type are masked by default.
    pub fn is_secret(self) -> bool {
        self.render_hint() == RenderHint::Masked
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(FieldType::Text),
            "password" => Ok(FieldType::Password),
            "hidden" => Ok(FieldType::Hidden),
            "email" => Ok(FieldType::Email),
            "url" => Ok(FieldType::Url),
            "phone" => Ok(FieldType::Phone),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "textarea" | "text-area" => Ok(FieldType::TextArea),
            other => Err(format!("unknown field type: {other}")),
        }
    }
}

fn accept_any(_: &str) -> Result<(), String> {
    Ok(())
}

fn verbatim(value: &str) -> String {
    value.to_string()
}

fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

fn digits_only(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

fn validate_email(value: &str) -> Result<(), String> {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return Err("missing @".to_string());
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err("expected name@domain".to_string());
    }
    if value.chars().any(char::is_whitespace) {
        return Err("email addresses cannot contain spaces".to_string());
    }
    Ok(())
}

fn validate_url(value: &str) -> Result<(), String> {
    let value = value.trim();
    // Bare hosts ("example.com") are accepted the same way browsers accept them.
    let parsed = Url::parse(value).or_else(|_| Url::parse(&format!("https://{value}")));
    match parsed {
        Ok(url) if url.has_host() || url.scheme() != "https" => Ok(()),
        Ok(_) => Err("missing host".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn validate_phone(value: &str) -> Result<(), String> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')');
    if !value.chars().all(allowed) {
        return Err("only digits, spaces and + - ( ) are allowed".to_string());
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err("no digits".to_string());
    }
    Ok(())
}

fn validate_number(value: &str) -> Result<(), String> {
    let digits = digits_only(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("digits only".to_string());
    }
    Ok(())
}

fn validate_date(value: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| "expected YYYY-MM-DD".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_capability_row() {
        for field_type in FieldType::ALL {
            // Indexing would panic if the table were short.
            let _ = field_type.capability();
        }
        assert_eq!(CAPABILITIES.len(), FieldType::ALL.len());
    }

    #[test]
    fn test_email_validation() {
        assert!(FieldType::Email.validate("jane@example.com").is_ok());
        assert!(FieldType::Email.validate("jane").is_err());
        assert!(FieldType::Email.validate("@example.com").is_err());
        assert!(FieldType::Email.validate("a@b@c").is_err());
    }

    #[test]
    fn test_url_accepts_bare_hosts() {
        assert!(FieldType::Url.validate("https://example.com/login").is_ok());
        assert!(FieldType::Url.validate("example.com").is_ok());
        assert!(FieldType::Url.validate("not a url").is_err());
    }

    #[test]
    fn test_number_serializes_without_separators() {
        assert!(FieldType::Number.validate("4111 1111-1111 1111").is_ok());
        assert_eq!(FieldType::Number.serialize("4111 1111-1111 1111"), "4111111111111111");
        assert!(FieldType::Number.validate("12a").is_err());
    }

    #[test]
    fn test_date_and_phone() {
        assert!(FieldType::Date.validate("1990-02-28").is_ok());
        assert!(FieldType::Date.validate("28/02/1990").is_err());
        assert!(FieldType::Phone.validate("+31 (0)20-123").is_ok());
        assert!(FieldType::Phone.validate("call me").is_err());
    }

    #[test]
    fn test_password_is_kept_verbatim_and_masked() {
        assert_eq!(FieldType::Password.serialize(" pad "), " pad ");
        assert!(FieldType::Password.is_secret());
        assert!(!FieldType::Text.is_secret());
    }

    #[test]
    fn test_url_serializes_as_upper_case_tag() {
        assert_eq!(serde_json::to_string(&FieldType::Url).unwrap(), "\"URL\"");
    }
}
