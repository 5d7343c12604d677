//! Key management operations behind the `keys` subcommands.

use crate::auth::{ApiKeyAuthority, ApiKeyInfo, AuthError, Permission};
use chrono::{DateTime, Duration, Utc};
use std::fmt::Write;

/// Replaces `old_raw` with a fresh key carrying the same name, permissions,
/// rate limit and expiry. Returns the new raw key.
///
/// Unknown or already revoked keys are `NotFound`. When the key file cannot
/// be written the old key stays valid.
pub fn rotate_api_key(authority: &ApiKeyAuthority, old_raw: &str) -> Result<String, AuthError> {
    authority.rotate_api_key(old_raw)
}

/// Parses a comma separated permission list such as `ingest_logs,metrics`.
pub fn parse_permissions(list: &str) -> Result<Vec<Permission>, AuthError> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

pub fn expiry_from_days(days: Option<u32>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    days.map(|d| now + Duration::days(i64::from(d)))
}

/// Plain-text table for `keys list`.
pub fn format_key_table(keys: &[(String, ApiKeyInfo)], now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{:<14} {:<20} {:<8} {:<10} {:<34} {}\n",
        "HASH", "NAME", "STATE", "RATE/MIN", "PERMISSIONS", "EXPIRES"
    );
    for (prefix, info) in keys {
        let state = if !info.is_active {
            "revoked"
        } else if info.is_expired_at(now) {
            "expired"
        } else {
            "active"
        };
        let permissions = info
            .permissions
            .iter()
            .map(Permission::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let rate = if info.rate_limit == 0 {
            "-".to_string()
        } else {
            info.rate_limit.to_string()
        };
        let expires = info
            .expires_at
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d").to_string());

        let _ = writeln!(
            out,
            "{prefix:<14} {:<20} {state:<8} {rate:<10} {permissions:<34} {expires}",
            info.name
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_preserves_identity() {
        let authority = ApiKeyAuthority::new(true);
        let expires = Utc::now() + Duration::days(10);
        let old = authority
            .create_api_key("svc", [Permission::IngestLogs, Permission::Metrics], 120, Some(expires))
            .unwrap();

        let new = rotate_api_key(&authority, &old).unwrap();
        assert_ne!(old, new);
        assert!(authority.validate_api_key(&old).is_none());

        let rotated = authority.validate_api_key(&new).unwrap().info;
        assert_eq!(rotated.name, "svc");
        assert_eq!(rotated.rate_limit, 120);
        assert_eq!(rotated.expires_at, Some(expires));
        assert!(rotated.permissions.contains(&Permission::Metrics));
    }

    #[test]
    fn test_rotate_unknown_or_revoked_key() {
        let authority = ApiKeyAuthority::new(true);
        assert!(matches!(
            rotate_api_key(&authority, "rsk_nope"),
            Err(AuthError::NotFound)
        ));

        let raw = authority
            .create_api_key("svc", [Permission::IngestLogs], 0, None)
            .unwrap();
        authority.revoke_api_key(&raw).unwrap();
        assert!(matches!(
            rotate_api_key(&authority, &raw),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn test_parse_permissions() {
        assert_eq!(
            parse_permissions("ingest_logs, QUERY_LOGS").unwrap(),
            vec![Permission::IngestLogs, Permission::QueryLogs]
        );
        assert!(matches!(
            parse_permissions("ingest_logs,superuser"),
            Err(AuthError::UnknownPermission(p)) if p == "superuser"
        ));
    }

    #[test]
    fn test_table_never_contains_raw_key() {
        let authority = ApiKeyAuthority::new(true);
        let raw = authority
            .create_api_key("svc", [Permission::Admin], 0, None)
            .unwrap();

        let table = format_key_table(&authority.list_api_keys(), Utc::now());
        assert!(table.contains("svc"));
        assert!(table.contains("active"));
        assert!(!table.contains(&raw));
    }
}
