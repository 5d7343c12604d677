use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAction {
    Mask,
    Hash,
    Drop,
}

impl FieldAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldAction::Mask => "mask",
            FieldAction::Hash => "hash",
            FieldAction::Drop => "drop",
        }
    }
}

/// Explicit rule for a metadata field name.
///
/// For `mask`, a `pattern` restricts masking to its matches (or to the single
/// capture group, if it has one). For `hash` and `drop`, the rule only fires
/// when the value matches the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    pub action: FieldAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, action: FieldAction) -> Self {
        Self {
            field: field.into(),
            action,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataProtectionConfig {
    pub enabled: bool,
    /// Ordered; for a given field the first rule wins, and any rule here
    /// overrides the name lists below.
    pub field_rules: Vec<FieldRule>,
    pub mask_fields: Vec<String>,
    pub hash_fields: Vec<String>,
    pub drop_fields: Vec<String>,
    /// Mask credit cards, SSNs, emails, IPv4 addresses and phone numbers
    /// found in the message text.
    pub scan_messages: bool,
    pub mask_char: char,
    pub hash_salt: String,
    pub audit_enabled: bool,
    pub audit_dir: PathBuf,
}

impl Default for DataProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            field_rules: Vec::new(),
            mask_fields: ["password", "passwd", "secret", "token", "api_key", "authorization"]
                .map(String::from)
                .to_vec(),
            hash_fields: ["email", "user_email"].map(String::from).to_vec(),
            drop_fields: ["credit_card", "card_number", "ssn"].map(String::from).to_vec(),
            scan_messages: true,
            mask_char: '*',
            hash_salt: String::new(),
            audit_enabled: false,
            audit_dir: PathBuf::from("./audit"),
        }
    }
}

impl DataProtectionConfig {
    /// Configuration that leaves every entry untouched.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
