mod common;

use chrono::Utc;
use common::entry;
use proptest::prelude::*;
use rask_log_ingest::domain::{LogLevel, MetadataValue};
use rask_log_ingest::protection::{
    AuditEntry, DataProtectionConfig, DataProtector, FieldAction, FieldRule, HASH_PREFIX,
    hash_value, mask_value,
};
use tempfile::TempDir;
use tracing_test::traced_test;

proptest! {
    #[test]
    fn mask_preserves_length(value in "\\PC{0,64}") {
        let masked = mask_value(&value, '*');
        prop_assert_eq!(masked.chars().count(), value.chars().count());
    }

    #[test]
    fn mask_keeps_only_edges(value in "[a-z0-9]{5,40}") {
        let masked: Vec<char> = mask_value(&value, '#').chars().collect();
        let original: Vec<char> = value.chars().collect();
        let n = original.len();
        prop_assert_eq!(&masked[..2], &original[..2]);
        prop_assert_eq!(&masked[n - 2..], &original[n - 2..]);
        prop_assert!(masked[2..n - 2].iter().all(|c| *c == '#'));
    }
}

#[test]
fn test_mask_examples() {
    assert_eq!(mask_value("password123", '*'), "pa*******23");
    assert_eq!(mask_value("abcd", '*'), "****");
    assert_eq!(mask_value("", '*'), "");
}

#[test]
fn test_hash_is_deterministic_and_prefixed() {
    let a = hash_value("user@example.com", "pepper");
    assert_eq!(a, hash_value("user@example.com", "pepper"));
    assert_ne!(a, hash_value("user@example.com", "salt"));
    assert!(a.starts_with(HASH_PREFIX));
    assert_eq!(a.len(), HASH_PREFIX.len() + 64);
}

#[test]
fn test_default_rules_cover_common_secrets() {
    let protector = DataProtector::new(DataProtectionConfig::default()).unwrap();
    let mut log = entry("svc", LogLevel::Info, "user signed in")
        .with_metadata("Password", "password123")
        .with_metadata("email", "a@b.io")
        .with_metadata("credit_card", "4111111111111111")
        .with_metadata("request_id", "req-1");

    let changed = protector.process_log_entry(&mut log).unwrap();
    assert_eq!(changed, 3);
    assert_eq!(log.metadata["Password"].render(), "pa*******23");
    assert!(log.metadata["email"].render().starts_with(HASH_PREFIX));
    assert!(!log.metadata.contains_key("credit_card"));
    assert_eq!(log.metadata["request_id"], MetadataValue::from("req-1"));
}

#[test]
fn test_pattern_rule_masks_only_captured_span() {
    let config = DataProtectionConfig {
        field_rules: vec![
            FieldRule::new("auth_header", FieldAction::Mask).with_pattern(r"Bearer (\S+)"),
        ],
        ..DataProtectionConfig::default()
    };
    let protector = DataProtector::new(config).unwrap();
    let mut log = entry("svc", LogLevel::Info, "call").with_metadata("auth_header", "Bearer abcdef");

    protector.process_log_entry(&mut log).unwrap();
    assert_eq!(log.metadata["auth_header"].render(), "Bearer ab**ef");
}

#[test]
fn test_message_scanning_masks_pii() {
    let protector = DataProtector::new(DataProtectionConfig::default()).unwrap();
    let mut log = entry("svc", LogLevel::Warn, "contact jane.doe@example.com from 10.0.0.12");

    assert_eq!(protector.process_log_entry(&mut log).unwrap(), 1);
    assert!(!log.message.contains("jane.doe@example.com"));
    assert!(!log.message.contains("10.0.0.12"));
    assert!(log.message.starts_with("contact "));
}

#[test]
fn test_audit_file_records_each_processed_entry() {
    let dir = TempDir::new().unwrap();
    let config = DataProtectionConfig {
        audit_enabled: true,
        audit_dir: dir.path().to_path_buf(),
        ..DataProtectionConfig::default()
    };
    let protector = DataProtector::new(config).unwrap();

    let mut logs = vec![
        entry("svc", LogLevel::Info, "one").with_metadata("token", "tok-123456"),
        entry("svc", LogLevel::Info, "nothing to redact"),
        entry("svc", LogLevel::Info, "two").with_metadata("ssn", "123-45-6789"),
    ];
    let report = protector.process_batch(&mut logs);
    assert_eq!(report.processed, 3);
    assert_eq!(report.modified, 2);
    assert_eq!(report.failed(), 0);

    let path = dir
        .path()
        .join(format!("audit-{}.jsonl", Utc::now().format("%Y-%m-%d")));
    let lines: Vec<AuditEntry> = std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].log_id, logs[0].id);
    assert_eq!(lines[0].actions[0].field, "token");
    assert_eq!(lines[0].actions[0].original_value, "tok-123456");
    assert_eq!(lines[1].actions[0].action, FieldAction::Drop);
    assert_eq!(lines[1].actions[0].new_value, None);
}

#[test]
#[traced_test]
fn test_audit_falls_back_to_tracing_without_leaking_values() {
    let dir = TempDir::new().unwrap();
    // A regular file where the audit directory should be.
    let blocked = dir.path().join("not-a-dir");
    std::fs::write(&blocked, b"").unwrap();

    let config = DataProtectionConfig {
        audit_enabled: true,
        audit_dir: blocked,
        ..DataProtectionConfig::default()
    };
    let protector = DataProtector::new(config).unwrap();
    let mut log = entry("svc", LogLevel::Info, "login").with_metadata("password", "hunter2hunter2");

    assert_eq!(protector.process_log_entry(&mut log).unwrap(), 1);
    assert!(logs_contain("Audit sink unavailable"));
    assert!(logs_contain("[REDACTED]"));
    assert!(!logs_contain("hunter2hunter2"));
}

#[test]
fn test_hot_reload_changes_behavior() {
    let protector = DataProtector::new(DataProtectionConfig::default()).unwrap();
    protector
        .update_config(DataProtectionConfig {
            mask_fields: vec!["customer".to_string()],
            ..DataProtectionConfig::default()
        })
        .unwrap();

    let mut log = entry("svc", LogLevel::Info, "order").with_metadata("customer", "ACME Corp");
    protector.process_log_entry(&mut log).unwrap();
    assert_eq!(log.metadata["customer"].render(), "AC*****rp");

    protector.update_config(DataProtectionConfig::disabled()).unwrap();
    let mut log = entry("svc", LogLevel::Info, "order").with_metadata("password", "secret-value");
    assert_eq!(protector.process_log_entry(&mut log).unwrap(), 0);
}
