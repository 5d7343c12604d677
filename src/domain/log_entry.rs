use super::error::ValidationError;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub const MAX_MESSAGE_LEN: usize = 32 * 1024;
pub const MAX_IDENTIFIER_LEN: usize = 128;
pub const MAX_METADATA_KEYS: usize = 100;

/// SDK origin of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Go,
    Python,
    Javascript,
    Browser,
    React,
    Android,
    Ios,
    Flutter,
    Java,
    Rust,
    Dotnet,
    Other,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Go => "go",
            Platform::Python => "python",
            Platform::Javascript => "javascript",
            Platform::Browser => "browser",
            Platform::React => "react",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Flutter => "flutter",
            Platform::Java => "java",
            Platform::Rust => "rust",
            Platform::Dotnet => "dotnet",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata value attached to a log entry.
///
/// A closed set of variants so redaction can match exhaustively. Serialized
/// untagged, which keeps the wire form plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Textual form used when a value has to be masked or hashed.
    /// Strings are returned as-is, everything else as compact JSON.
    pub fn render(&self) -> String {
        match self {
            MetadataValue::String(s) => s.clone(),
            MetadataValue::Null => "null".to_string(),
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::Float(f) => f.to_string(),
            MetadataValue::List(_) | MetadataValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// One observation emitted by an agent.
///
/// This is the canonical representation throughout the write path, from the
/// ingestion boundary through the buffer, recovery files and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub service_name: String,
    pub agent_id: String,
    pub platform: Platform,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, MetadataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl LogEntry {
    /// Creates an entry with a fresh id and the current timestamp.
    pub fn new(
        service_name: impl Into<String>,
        agent_id: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            service_name: service_name.into(),
            agent_id: agent_id.into(),
            platform,
            metadata: BTreeMap::new(),
            device_info: None,
            source_location: None,
            stack_trace: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks every boundary invariant. Entries failing this are rejected,
    /// never buffered or coerced.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "id" });
        }

        let message = self.message.trim();
        if message.is_empty() {
            return Err(ValidationError::MissingField { field: "message" });
        }
        if self.message.len() > MAX_MESSAGE_LEN {
            return Err(ValidationError::TooLong {
                field: "message",
                max_len: MAX_MESSAGE_LEN,
            });
        }

        validate_identifier("service_name", &self.service_name)?;
        validate_identifier("agent_id", &self.agent_id)?;

        if self.metadata.len() > MAX_METADATA_KEYS {
            return Err(ValidationError::TooManyMetadataKeys {
                count: self.metadata.len(),
                max: MAX_METADATA_KEYS,
            });
        }
        if self.metadata.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::InvalidMetadataKey);
        }

        Ok(())
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field,
            max_len: MAX_IDENTIFIER_LEN,
        });
    }
    if let Some((position, character)) = value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ValidationError::InvalidCharacter {
            field,
            position,
            character,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LogEntry {
        LogEntry::new("checkout-api", "agent_01", LogLevel::Info, "order placed", Platform::Go)
    }

    #[test]
    fn test_valid_entry_passes() {
        assert!(entry().validate().is_ok());
    }

    #[test]
    fn test_blank_message_rejected() {
        let mut e = entry();
        e.message = "   ".to_string();
        assert_eq!(
            e.validate(),
            Err(ValidationError::MissingField { field: "message" })
        );
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut e = entry();
        e.message = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            e.validate(),
            Err(ValidationError::TooLong { field: "message", .. })
        ));
    }

    #[test]
    fn test_identifier_charset_enforced() {
        let mut e = entry();
        e.service_name = "checkout api".to_string();
        assert_eq!(
            e.validate(),
            Err(ValidationError::InvalidCharacter {
                field: "service_name",
                position: 8,
                character: ' ',
            })
        );

        let mut e = entry();
        e.agent_id = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(matches!(
            e.validate(),
            Err(ValidationError::TooLong { field: "agent_id", .. })
        ));
    }

    #[test]
    fn test_metadata_roundtrips_as_plain_json() {
        let e = entry()
            .with_metadata("user", "alice")
            .with_metadata("attempt", 3_i64)
            .with_metadata("retry", true);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["metadata"]["user"], "alice");
        assert_eq!(json["metadata"]["attempt"], 3);
        assert_eq!(json["metadata"]["retry"], true);

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_render_non_string_values() {
        assert_eq!(MetadataValue::Integer(42).render(), "42");
        assert_eq!(MetadataValue::Bool(false).render(), "false");
        let mut nested = BTreeMap::new();
        nested.insert("k".to_string(), MetadataValue::from("v"));
        assert_eq!(MetadataValue::Map(nested).render(), r#"{"k":"v"}"#);
    }
}
