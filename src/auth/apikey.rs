//! API key material and the metadata stored for each key.
//!
//! Raw keys are only ever returned to the caller that created them. What is
//! stored, listed and logged is the hex SHA-256 of the key.

use super::error::AuthError;
use chrono::{DateTime, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Prefix that makes keys recognizable in configs and secret scanners.
pub const API_KEY_PREFIX: &str = "rsk_";

const API_KEY_RANDOM_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    IngestLogs,
    QueryLogs,
    Admin,
    Metrics,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::IngestLogs,
        Permission::QueryLogs,
        Permission::Admin,
        Permission::Metrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::IngestLogs => "ingest_logs",
            Permission::QueryLogs => "query_logs",
            Permission::Admin => "admin",
            Permission::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AuthError::UnknownPermission(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyInfo {
    pub name: String,
    pub permissions: BTreeSet<Permission>,
    /// Requests per minute; 0 means unlimited.
    #[serde(default)]
    pub rate_limit: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ApiKeyInfo {
    pub fn new(
        name: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
        rate_limit: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
            rate_limit,
            created_at: Utc::now(),
            expires_at,
            last_used: None,
            is_active: true,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Active and not past its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        has_permission(self, permission)
    }
}

/// `admin` grants every permission.
pub fn has_permission(info: &ApiKeyInfo, permission: Permission) -> bool {
    info.permissions.contains(&Permission::Admin) || info.permissions.contains(&permission)
}

/// Generates `rsk_` followed by 64 hex characters of OS randomness.
pub fn generate_api_key() -> Result<String, AuthError> {
    let mut bytes = [0u8; API_KEY_RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Entropy(e.to_string()))?;
    Ok(format!("{API_KEY_PREFIX}{}", hex::encode(bytes)))
}

/// Hex SHA-256 of the raw key; the only form a key is stored under.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generated_key_shape() {
        let key = generate_api_key().unwrap();
        assert!(key.starts_with(API_KEY_PREFIX));
        let random = &key[API_KEY_PREFIX.len()..];
        assert_eq!(random.len(), 64);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key().unwrap());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_admin_implies_everything() {
        let info = ApiKeyInfo::new("ops", [Permission::Admin], 0, None);
        for permission in Permission::ALL {
            assert!(info.has_permission(permission));
        }

        let info = ApiKeyInfo::new("agent", [Permission::IngestLogs], 0, None);
        assert!(info.has_permission(Permission::IngestLogs));
        assert!(!info.has_permission(Permission::QueryLogs));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut info = ApiKeyInfo::new("agent", [Permission::IngestLogs], 0, Some(now - Duration::seconds(1)));
        assert!(!info.is_valid_at(now));

        info.expires_at = Some(now + Duration::days(1));
        assert!(info.is_valid_at(now));

        info.is_active = false;
        assert!(!info.is_valid_at(now));
    }

    #[test]
    fn test_permission_parsing() {
        assert_eq!("ingest_logs".parse::<Permission>().unwrap(), Permission::IngestLogs);
        assert_eq!("ADMIN".parse::<Permission>().unwrap(), Permission::Admin);
        assert!("write".parse::<Permission>().is_err());
    }
}
