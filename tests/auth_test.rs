use chrono::{Duration, Utc};
use rask_log_ingest::auth::{API_KEY_PREFIX, ApiKeyAuthority, AuthMode, Permission, hash_api_key};
use tempfile::TempDir;

#[test]
fn test_key_lifecycle() {
    let authority = ApiKeyAuthority::new(true);
    let raw = authority
        .create_api_key("checkout", [Permission::IngestLogs], 600, None)
        .unwrap();
    assert!(raw.starts_with(API_KEY_PREFIX));

    let validated = authority.validate_api_key(&raw).unwrap();
    assert_eq!(validated.mode, AuthMode::Verified);
    assert_eq!(validated.key_hash, hash_api_key(&raw));
    assert!(validated.has_permission(Permission::IngestLogs));
    assert!(!validated.has_permission(Permission::QueryLogs));

    assert!(authority.revoke_api_key(&raw).unwrap());
    assert!(authority.validate_api_key(&raw).is_none());
    // Revoking again is not an error.
    assert!(authority.revoke_api_key(&raw).unwrap());
    assert!(!authority.revoke_api_key("rsk_unknown").unwrap());
}

#[test]
fn test_expired_key_is_invalid() {
    let authority = ApiKeyAuthority::new(true);
    let expired = authority
        .create_api_key("old", [Permission::Admin], 0, Some(Utc::now() - Duration::seconds(1)))
        .unwrap();
    let current = authority
        .create_api_key("new", [Permission::Admin], 0, Some(Utc::now() + Duration::days(1)))
        .unwrap();

    assert!(authority.validate_api_key(&expired).is_none());
    assert!(authority.validate_api_key(&current).is_some());
    assert!(authority.key_info(&expired).unwrap().is_active);
}

#[test]
fn test_admin_key_has_every_permission() {
    let authority = ApiKeyAuthority::new(true);
    let raw = authority
        .create_api_key("ops", [Permission::Admin], 0, None)
        .unwrap();
    let validated = authority.validate_api_key(&raw).unwrap();
    assert!(Permission::ALL.into_iter().all(|p| validated.has_permission(p)));
}

#[test]
fn test_revoke_by_name_only_touches_active_matches() {
    let authority = ApiKeyAuthority::new(true);
    let a = authority.create_api_key("batch", [Permission::IngestLogs], 0, None).unwrap();
    let b = authority.create_api_key("batch", [Permission::IngestLogs], 0, None).unwrap();
    let other = authority.create_api_key("web", [Permission::IngestLogs], 0, None).unwrap();

    assert_eq!(authority.revoke_by_name("batch").unwrap(), 2);
    assert_eq!(authority.revoke_by_name("batch").unwrap(), 0);
    assert!(authority.validate_api_key(&a).is_none());
    assert!(authority.validate_api_key(&b).is_none());
    assert!(authority.validate_api_key(&other).is_some());
}

#[test]
fn test_keys_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys").join("api_keys.toml");

    let raw = {
        let authority = ApiKeyAuthority::load(&path).unwrap();
        assert!(authority.require_auth());
        authority
            .create_api_key("svc", [Permission::IngestLogs, Permission::Metrics], 60, None)
            .unwrap()
    };

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains(&raw));
    assert!(content.contains(&hash_api_key(&raw)));

    let reloaded = ApiKeyAuthority::load(&path).unwrap();
    let info = reloaded.validate_api_key(&raw).unwrap().info;
    assert_eq!(info.name, "svc");
    assert_eq!(info.rate_limit, 60);
    assert!(info.permissions.contains(&Permission::Metrics));

    reloaded.revoke_api_key(&raw).unwrap();
    let after_revoke = ApiKeyAuthority::load(&path).unwrap();
    assert!(after_revoke.validate_api_key(&raw).is_none());
}

#[cfg(unix)]
#[test]
fn test_key_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_keys.toml");
    let authority = ApiKeyAuthority::load(&path).unwrap();
    authority
        .create_api_key("svc", [Permission::IngestLogs], 0, None)
        .unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_require_auth_read_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_keys.toml");
    std::fs::write(&path, "require_auth = false\n").unwrap();

    let authority = ApiKeyAuthority::load(&path).unwrap();
    assert!(!authority.require_auth());
    let open = authority.validate_api_key("").unwrap();
    assert_eq!(open.mode, AuthMode::Open);
    assert!(open.has_permission(Permission::Admin));
}

#[test]
fn test_malformed_key_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_keys.toml");
    std::fs::write(&path, "keys = [\n").unwrap();

    assert!(ApiKeyAuthority::load(&path).is_err());
}

#[test]
fn test_failed_write_leaves_keys_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_keys.toml");
    let authority = ApiKeyAuthority::load(&path).unwrap();
    let raw = authority
        .create_api_key("web", [Permission::IngestLogs], 0, None)
        .unwrap();

    // The temp file used for atomic writes cannot be created.
    let blocker = dir.path().join("api_keys.toml.tmp");
    std::fs::create_dir(&blocker).unwrap();

    assert!(
        authority
            .create_api_key("batch", [Permission::IngestLogs], 0, None)
            .is_err()
    );
    assert_eq!(authority.key_count(), 1);

    assert!(authority.rotate_api_key(&raw).is_err());
    assert!(authority.revoke_api_key(&raw).is_err());
    assert!(authority.revoke_by_name("web").is_err());
    assert!(authority.validate_api_key(&raw).is_some());
    assert_eq!(authority.key_count(), 1);

    std::fs::remove_dir(&blocker).unwrap();
    let rotated = authority.rotate_api_key(&raw).unwrap();
    assert!(authority.validate_api_key(&raw).is_none());

    let reloaded = ApiKeyAuthority::load(&path).unwrap();
    assert_eq!(reloaded.key_count(), 2);
    assert!(reloaded.validate_api_key(&rotated).is_some());
}

#[test]
fn test_update_last_used() {
    let authority = ApiKeyAuthority::new(true);
    let raw = authority
        .create_api_key("web", [Permission::IngestLogs], 0, None)
        .unwrap();
    assert!(authority.key_info(&raw).unwrap().last_used.is_none());

    let before = Utc::now();
    authority.update_last_used(&raw);
    let last_used = authority.key_info(&raw).unwrap().last_used.unwrap();
    assert!(last_used >= before);

    // Unknown keys are ignored.
    authority.update_last_used("rsk_unknown");
    assert_eq!(authority.key_count(), 1);
}

#[test]
fn test_listing_tolerates_hand_edited_hashes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api_keys.toml");
    let raw = ApiKeyAuthority::load(&path)
        .unwrap()
        .create_api_key("web", [Permission::IngestLogs], 0, None)
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let hash = hash_api_key(&raw);
    let quoted = format!("\"{hash}\"");
    let replacement = format!("\"{}\"", "é".repeat(20));
    let edited = if content.contains(&quoted) {
        content.replace(&quoted, &replacement)
    } else {
        content.replace(&hash, &replacement)
    };
    assert_ne!(content, edited);
    std::fs::write(&path, edited).unwrap();

    let keys = ApiKeyAuthority::load(&path).unwrap().list_api_keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].0, "é".repeat(12));
}
