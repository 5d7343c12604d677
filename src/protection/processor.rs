use super::audit::{AuditAction, AuditEntry, AuditLogger};
use super::config::{DataProtectionConfig, FieldAction};
use super::error::ProtectionError;
use crate::domain::{LogEntry, MetadataValue};
use parking_lot::RwLock;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const HASH_PREFIX: &str = "sha256:";

/// Nesting limit for metadata maps walked by the field rules.
pub const MAX_METADATA_DEPTH: usize = 16;

const MESSAGE_FIELD: &str = "message";

/// Applied to message text in this order, each on the output of the last.
const MESSAGE_PATTERNS: [(&str, &str); 5] = [
    ("credit_card", r"\b(?:\d[ -]?){12,18}\d\b"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    (
        "ipv4",
        r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
    ),
    ("phone", r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]\d{4}\b"),
];

/// Masks a whole value: four characters or fewer are fully masked, longer
/// values keep their first and last two characters. Length is preserved.
pub fn mask_value(value: &str, mask_char: char) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= 4 {
        return std::iter::repeat_n(mask_char, len).collect();
    }

    let mut masked = String::with_capacity(value.len());
    masked.extend(&chars[..2]);
    masked.extend(std::iter::repeat_n(mask_char, len - 4));
    masked.extend(&chars[len - 2..]);
    masked
}

/// `sha256:` followed by the hex SHA-256 of `salt` then `value`.
pub fn hash_value(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(value.as_bytes());
    format!("{HASH_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Masks every match of `pattern` in `value`. With a capture group only the
/// group's span is masked. No match leaves the value unchanged.
fn mask_matches(value: &str, pattern: &Regex, mask_char: char) -> String {
    let use_group = pattern.captures_len() > 1;
    let mut out = String::with_capacity(value.len());
    let mut last = 0;

    for caps in pattern.captures_iter(value) {
        let span = if use_group { caps.get(1) } else { caps.get(0) };
        let Some(span) = span else {
            continue;
        };
        out.push_str(&value[last..span.start()]);
        out.push_str(&mask_value(span.as_str(), mask_char));
        last = span.end();
    }

    if last == 0 && out.is_empty() {
        return value.to_string();
    }
    out.push_str(&value[last..]);
    out
}

#[derive(Debug)]
struct CompiledRule {
    action: FieldAction,
    pattern: Option<Regex>,
}

/// A configuration with every regex compiled. Swapped as a whole.
struct Compiled {
    config: DataProtectionConfig,
    /// Keyed by lowercased field name.
    rules: HashMap<String, CompiledRule>,
    message_patterns: Vec<(&'static str, Regex)>,
    audit: Option<AuditLogger>,
}

impl Compiled {
    fn build(config: DataProtectionConfig) -> Result<Self, ProtectionError> {
        if config.mask_char.is_control() || config.mask_char.is_whitespace() {
            return Err(ProtectionError::InvalidMaskChar(config.mask_char));
        }

        let mut rules: HashMap<String, CompiledRule> = HashMap::new();
        let legacy = [
            (&config.mask_fields, FieldAction::Mask),
            (&config.hash_fields, FieldAction::Hash),
            (&config.drop_fields, FieldAction::Drop),
        ];
        for (fields, action) in legacy {
            for field in fields {
                let key = normalize_field(field)?;
                rules.insert(key, CompiledRule { action, pattern: None });
            }
        }

        let mut explicit: Vec<String> = Vec::with_capacity(config.field_rules.len());
        for rule in &config.field_rules {
            let key = normalize_field(&rule.field)?;
            if explicit.contains(&key) {
                continue;
            }
            let pattern = match &rule.pattern {
                Some(p) => {
                    let regex = Regex::new(p).map_err(|source| ProtectionError::InvalidPattern {
                        field: rule.field.clone(),
                        source,
                    })?;
                    if regex.captures_len() > 2 {
                        return Err(ProtectionError::InvalidRule(format!(
                            "pattern for field '{}' has more than one capture group",
                            rule.field
                        )));
                    }
                    Some(regex)
                }
                None => None,
            };
            rules.insert(key.clone(), CompiledRule {
                action: rule.action,
                pattern,
            });
            explicit.push(key);
        }

        let mut message_patterns = Vec::with_capacity(MESSAGE_PATTERNS.len());
        for (name, pattern) in MESSAGE_PATTERNS {
            let regex = Regex::new(pattern).map_err(|source| ProtectionError::InvalidPattern {
                field: name.to_string(),
                source,
            })?;
            message_patterns.push((name, regex));
        }

        let audit = config
            .audit_enabled
            .then(|| AuditLogger::new(config.audit_dir.clone()));

        Ok(Self {
            config,
            rules,
            message_patterns,
            audit,
        })
    }
}

fn normalize_field(field: &str) -> Result<String, ProtectionError> {
    let field = field.trim();
    if field.is_empty() {
        return Err(ProtectionError::InvalidRule(
            "field name must not be blank".to_string(),
        ));
    }
    Ok(field.to_lowercase())
}

/// Outcome of [`DataProtector::process_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchProtectionReport {
    pub processed: usize,
    /// Entries with at least one redaction.
    pub modified: usize,
    pub actions: usize,
    /// Ids of entries whose processing failed.
    pub failed_ids: Vec<String>,
}

impl BatchProtectionReport {
    pub fn failed(&self) -> usize {
        self.failed_ids.len()
    }
}

/// Redacts sensitive metadata and message content before entries are buffered.
pub struct DataProtector {
    compiled: RwLock<Arc<Compiled>>,
}

impl DataProtector {
    pub fn new(config: DataProtectionConfig) -> Result<Self, ProtectionError> {
        Ok(Self {
            compiled: RwLock::new(Arc::new(Compiled::build(config)?)),
        })
    }

    pub fn config(&self) -> DataProtectionConfig {
        self.compiled.read().config.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.compiled.read().config.enabled
    }

    /// Compiles `config` and swaps it in. A config that fails to compile
    /// leaves the current one active.
    pub fn update_config(&self, config: DataProtectionConfig) -> Result<(), ProtectionError> {
        let compiled = Arc::new(Compiled::build(config)?);
        *self.compiled.write() = compiled;
        tracing::info!("Data protection configuration updated");
        Ok(())
    }

    /// Applies field rules and message scanning to `entry` in place and
    /// returns the number of values changed.
    pub fn process_log_entry(&self, entry: &mut LogEntry) -> Result<usize, ProtectionError> {
        let compiled = self.compiled.read().clone();
        if !compiled.config.enabled {
            return Ok(0);
        }

        let mut actions = Vec::new();
        apply_rules(&compiled, &mut entry.metadata, "", 0, &mut actions)?;

        if compiled.config.scan_messages {
            let scanned = scan_message(&compiled, &entry.message);
            if scanned != entry.message {
                let original = std::mem::replace(&mut entry.message, scanned);
                actions.push(AuditAction {
                    field: MESSAGE_FIELD.to_string(),
                    action: FieldAction::Mask,
                    original_value: original,
                    new_value: Some(entry.message.clone()),
                });
            }
        }

        let changed = actions.len();
        if changed > 0 {
            tracing::debug!(log_id = %entry.id, changed, "Redacted sensitive fields");
            if let Some(audit) = &compiled.audit {
                audit.record(&AuditEntry::new(entry, actions));
            }
        }
        Ok(changed)
    }

    /// Processes every entry; a failure on one entry is logged and reported
    /// without stopping the rest. Failed entries may be partially redacted.
    pub fn process_batch(&self, entries: &mut [LogEntry]) -> BatchProtectionReport {
        let mut report = BatchProtectionReport::default();
        for entry in &mut *entries {
            report.processed += 1;
            match self.process_log_entry(entry) {
                Ok(0) => {}
                Ok(changed) => {
                    report.modified += 1;
                    report.actions += changed;
                }
                Err(e) => {
                    report.failed_ids.push(entry.id.clone());
                    tracing::warn!(log_id = %entry.id, error = %e, "Data protection failed for entry");
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for DataProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let compiled = self.compiled.read();
        f.debug_struct("DataProtector")
            .field("enabled", &compiled.config.enabled)
            .field("rules", &compiled.rules.len())
            .field("audit", &compiled.audit)
            .finish()
    }
}

fn apply_rules(
    compiled: &Compiled,
    map: &mut BTreeMap<String, MetadataValue>,
    prefix: &str,
    depth: usize,
    actions: &mut Vec<AuditAction>,
) -> Result<(), ProtectionError> {
    if depth >= MAX_METADATA_DEPTH {
        return Err(ProtectionError::NestingTooDeep {
            max_depth: MAX_METADATA_DEPTH,
        });
    }

    let mut dropped = Vec::new();
    for (key, value) in map.iter_mut() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        let Some(rule) = compiled.rules.get(&key.to_lowercase()) else {
            if let MetadataValue::Map(nested) = value {
                apply_rules(compiled, nested, &path, depth + 1, actions)?;
            }
            continue;
        };

        let original = value.render();
        if rule.action != FieldAction::Mask
            && let Some(pattern) = &rule.pattern
            && !pattern.is_match(&original)
        {
            continue;
        }

        match rule.action {
            FieldAction::Mask => {
                let masked = match &rule.pattern {
                    Some(pattern) => mask_matches(&original, pattern, compiled.config.mask_char),
                    None => mask_value(&original, compiled.config.mask_char),
                };
                if masked == original && matches!(value, MetadataValue::String(_)) {
                    continue;
                }
                *value = MetadataValue::String(masked.clone());
                actions.push(AuditAction {
                    field: path,
                    action: FieldAction::Mask,
                    original_value: original,
                    new_value: Some(masked),
                });
            }
            FieldAction::Hash => {
                let hashed = hash_value(&original, &compiled.config.hash_salt);
                *value = MetadataValue::String(hashed.clone());
                actions.push(AuditAction {
                    field: path,
                    action: FieldAction::Hash,
                    original_value: original,
                    new_value: Some(hashed),
                });
            }
            FieldAction::Drop => {
                dropped.push(key.clone());
                actions.push(AuditAction {
                    field: path,
                    action: FieldAction::Drop,
                    original_value: original,
                    new_value: None,
                });
            }
        }
    }

    for key in dropped {
        map.remove(&key);
    }
    Ok(())
}

fn scan_message(compiled: &Compiled, message: &str) -> String {
    let mut text = message.to_string();
    for (_, pattern) in &compiled.message_patterns {
        if pattern.is_match(&text) {
            text = mask_matches(&text, pattern, compiled.config.mask_char);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogLevel, Platform};
    use crate::protection::FieldRule;

    fn entry() -> LogEntry {
        LogEntry::new("svc", "agent-1", LogLevel::Info, "login ok", Platform::Go)
    }

    fn protector(config: DataProtectionConfig) -> DataProtector {
        DataProtector::new(config).unwrap()
    }

    #[test]
    fn test_mask_value_lengths() {
        assert_eq!(mask_value("password123", '*'), "pa*******23");
        assert_eq!(mask_value("abcd", '*'), "****");
        assert_eq!(mask_value("abcde", '#'), "ab#de");
        assert_eq!(mask_value("", '*'), "");
        assert_eq!(mask_value("päßwörd", '*'), "pä***rd");
    }

    #[test]
    fn test_hash_value_is_salted_and_prefixed() {
        let a = hash_value("alice@example.com", "salt");
        assert!(a.starts_with(HASH_PREFIX));
        assert_eq!(a.len(), HASH_PREFIX.len() + 64);
        assert_eq!(a, hash_value("alice@example.com", "salt"));
        assert_ne!(a, hash_value("alice@example.com", "pepper"));
    }

    #[test]
    fn test_mask_matches_uses_capture_group() {
        let pattern = Regex::new(r"token=(\w+)").unwrap();
        assert_eq!(
            mask_matches("a token=abcdef123 b", &pattern, '*'),
            "a token=ab*****23 b"
        );

        let pattern = Regex::new(r"\d{4}").unwrap();
        assert_eq!(mask_matches("pin 1234 ok", &pattern, '*'), "pin **** ok");
        assert_eq!(mask_matches("no digits", &pattern, '*'), "no digits");
    }

    #[test]
    fn test_legacy_lists_apply_case_insensitively() {
        let protector = protector(DataProtectionConfig::default());
        let mut e = entry()
            .with_metadata("Password", "password123")
            .with_metadata("email", "alice@example.com")
            .with_metadata("ssn", "123-45-6789")
            .with_metadata("path", "/index");

        let changed = protector.process_log_entry(&mut e).unwrap();
        assert_eq!(changed, 3);
        assert_eq!(e.metadata["Password"], MetadataValue::from("pa*******23"));
        assert_eq!(
            e.metadata["email"],
            MetadataValue::String(hash_value("alice@example.com", ""))
        );
        assert!(!e.metadata.contains_key("ssn"));
        assert_eq!(e.metadata["path"], MetadataValue::from("/index"));
    }

    #[test]
    fn test_explicit_rule_overrides_legacy_list() {
        let config = DataProtectionConfig {
            field_rules: vec![
                FieldRule::new("email", FieldAction::Drop),
                FieldRule::new("email", FieldAction::Mask),
            ],
            ..DataProtectionConfig::default()
        };
        let protector = protector(config);
        let mut e = entry().with_metadata("email", "alice@example.com");
        protector.process_log_entry(&mut e).unwrap();
        assert!(e.metadata.is_empty());
    }

    #[test]
    fn test_nested_maps_are_walked() {
        let protector = protector(DataProtectionConfig::default());
        let mut inner = BTreeMap::new();
        inner.insert("token".to_string(), MetadataValue::from("abcdefgh"));
        inner.insert("count".to_string(), MetadataValue::Integer(2));
        let mut e = entry().with_metadata("request", MetadataValue::Map(inner));

        protector.process_log_entry(&mut e).unwrap();
        let MetadataValue::Map(inner) = &e.metadata["request"] else {
            panic!("request should still be a map");
        };
        assert_eq!(inner["token"], MetadataValue::from("ab****gh"));
        assert_eq!(inner["count"], MetadataValue::Integer(2));
    }

    #[test]
    fn test_non_string_values_are_rendered() {
        let protector = protector(DataProtectionConfig::default());
        let mut e = entry().with_metadata("token", 123_456_i64);
        protector.process_log_entry(&mut e).unwrap();
        assert_eq!(e.metadata["token"], MetadataValue::from("12**56"));
    }

    #[test]
    fn test_message_scanning() {
        let protector = protector(DataProtectionConfig::default());
        let mut e = entry();
        e.message = "card 4111111111111111 from 192.168.1.10 mail bob@corp.io".to_string();

        assert_eq!(protector.process_log_entry(&mut e).unwrap(), 1);
        assert!(!e.message.contains("4111111111111111"));
        assert!(!e.message.contains("192.168.1.10"));
        assert!(!e.message.contains("bob@corp.io"));
        assert!(e.message.starts_with("card 41"));
        assert_eq!(e.message.len(), "card 4111111111111111 from 192.168.1.10 mail bob@corp.io".len());
    }

    #[test]
    fn test_disabled_is_noop() {
        let protector = protector(DataProtectionConfig::disabled());
        let mut e = entry().with_metadata("password", "secret-value");
        let before = e.clone();
        assert_eq!(protector.process_log_entry(&mut e).unwrap(), 0);
        assert_eq!(e, before);
    }

    #[test]
    fn test_bad_update_keeps_previous_config() {
        let protector = protector(DataProtectionConfig::default());
        let bad = DataProtectionConfig {
            field_rules: vec![FieldRule::new("x", FieldAction::Mask).with_pattern("(unclosed")],
            ..DataProtectionConfig::default()
        };
        assert!(matches!(
            protector.update_config(bad),
            Err(ProtectionError::InvalidPattern { .. })
        ));
        assert_eq!(protector.config(), DataProtectionConfig::default());

        assert!(protector.update_config(DataProtectionConfig::disabled()).is_ok());
        assert!(!protector.is_enabled());
    }

    #[test]
    fn test_too_deep_nesting_fails_entry_but_not_batch() {
        let protector = protector(DataProtectionConfig::default());
        let mut value = MetadataValue::from("leaf");
        for _ in 0..MAX_METADATA_DEPTH + 1 {
            let mut map = BTreeMap::new();
            map.insert("inner".to_string(), value);
            value = MetadataValue::Map(map);
        }
        let mut entries = vec![
            entry().with_metadata("deep", value),
            entry().with_metadata("password", "hunter2hunter2"),
        ];

        let report = protector.process_batch(&mut entries);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failed_ids, vec![entries[0].id.clone()]);
        assert_eq!(report.modified, 1);
    }
}
