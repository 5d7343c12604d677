use super::apikey::{ApiKeyInfo, Permission, generate_api_key, hash_api_key};
use super::error::AuthError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Length of the hash prefix shown when keys are listed.
pub const HASH_PREFIX_LEN: usize = 12;

const OPEN_IDENTITY_NAME: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Authentication is disabled; the caller gets the open identity.
    Open,
    /// The key was found, active and unexpired.
    Verified,
}

#[derive(Debug, Clone)]
pub struct ValidatedKey {
    /// Empty in open mode.
    pub key_hash: String,
    pub info: ApiKeyInfo,
    pub mode: AuthMode,
}

impl ValidatedKey {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.info.has_permission(permission)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    #[serde(default = "default_require_auth")]
    require_auth: bool,
    #[serde(default)]
    keys: BTreeMap<String, ApiKeyInfo>,
}

fn default_require_auth() -> bool {
    true
}

struct State {
    require_auth: bool,
    keys: HashMap<String, ApiKeyInfo>,
}

/// Owns the set of known API keys.
///
/// When built with [`ApiKeyAuthority::load`], every mutation is written to
/// the key file before it becomes visible; a failed write leaves the keys
/// unchanged. `last_used` updates are kept in memory and reach the file with
/// the next write.
pub struct ApiKeyAuthority {
    state: Mutex<State>,
    path: Option<PathBuf>,
}

impl ApiKeyAuthority {
    /// In-memory authority with no backing file.
    pub fn new(require_auth: bool) -> Self {
        Self {
            state: Mutex::new(State {
                require_auth,
                keys: HashMap::new(),
            }),
            path: None,
        }
    }

    /// Loads keys from `path`. A missing file yields an empty authority that
    /// requires auth and creates the file on first write.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<KeyFile>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyFile {
                require_auth: true,
                keys: BTreeMap::new(),
            },
            Err(source) => return Err(AuthError::Io { path, source }),
        };

        tracing::info!(
            path = %path.display(),
            keys = file.keys.len(),
            require_auth = file.require_auth,
            "Loaded API keys"
        );

        Ok(Self {
            state: Mutex::new(State {
                require_auth: file.require_auth,
                keys: file.keys.into_iter().collect(),
            }),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn require_auth(&self) -> bool {
        self.state.lock().require_auth
    }

    /// Runtime switch; persisted only with the next write.
    pub fn set_require_auth(&self, require_auth: bool) {
        self.state.lock().require_auth = require_auth;
    }

    pub fn key_count(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Registers a new key and returns the raw key. The raw key is not
    /// retained anywhere.
    pub fn create_api_key(
        &self,
        name: &str,
        permissions: impl IntoIterator<Item = Permission>,
        rate_limit: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidName);
        }
        let info = ApiKeyInfo::new(name, permissions, rate_limit, expires_at);
        if info.permissions.is_empty() {
            return Err(AuthError::NoPermissions);
        }

        let raw = generate_api_key()?;
        let hash = hash_api_key(&raw);
        let prefix = hash_prefix(&hash).to_string();
        self.commit(|keys| {
            keys.insert(hash, info);
            Ok(())
        })?;

        tracing::info!(name, hash_prefix = %prefix, "API key created");
        Ok(raw)
    }

    /// Resolves a raw key to its identity.
    ///
    /// With auth disabled every caller gets the open identity. Otherwise the
    /// key must exist, be active and be unexpired; a hit refreshes `last_used`.
    pub fn validate_api_key(&self, raw: &str) -> Option<ValidatedKey> {
        let mut state = self.state.lock();
        if !state.require_auth {
            return Some(ValidatedKey {
                key_hash: String::new(),
                info: open_identity(),
                mode: AuthMode::Open,
            });
        }
        if raw.is_empty() {
            return None;
        }

        let hash = hash_api_key(raw);
        let now = Utc::now();
        let info = state.keys.get_mut(&hash)?;
        if !info.is_valid_at(now) {
            return None;
        }
        info.last_used = Some(now);
        let info = info.clone();
        drop(state);

        Some(ValidatedKey {
            key_hash: hash,
            info,
            mode: AuthMode::Verified,
        })
    }

    /// Best effort; unknown keys are ignored.
    pub fn update_last_used(&self, raw: &str) {
        let hash = hash_api_key(raw);
        if let Some(info) = self.state.lock().keys.get_mut(&hash) {
            info.last_used = Some(Utc::now());
        }
    }

    /// Metadata for a raw key regardless of its validity.
    pub fn key_info(&self, raw: &str) -> Option<ApiKeyInfo> {
        self.state.lock().keys.get(&hash_api_key(raw)).cloned()
    }

    /// Marks a key inactive. Returns `false` for unknown keys; revoking an
    /// already revoked key succeeds again.
    pub fn revoke_api_key(&self, raw: &str) -> Result<bool, AuthError> {
        let hash = hash_api_key(raw);
        let name = self.commit(|keys| {
            Ok(keys.get_mut(&hash).map(|info| {
                info.is_active = false;
                info.name.clone()
            }))
        })?;
        let Some(name) = name else {
            return Ok(false);
        };

        tracing::info!(name = %name, hash_prefix = hash_prefix(&hash), "API key revoked");
        Ok(true)
    }

    /// Revokes every active key called `name`; returns how many were revoked.
    pub fn revoke_by_name(&self, name: &str) -> Result<usize, AuthError> {
        let revoked = self.commit(|keys| {
            let mut revoked = 0;
            for info in keys.values_mut() {
                if info.is_active && info.name == name {
                    info.is_active = false;
                    revoked += 1;
                }
            }
            Ok(revoked)
        })?;
        if revoked > 0 {
            tracing::info!(name, revoked, "API keys revoked by name");
        }
        Ok(revoked)
    }

    /// Revokes `old_raw` and registers a replacement with the same name,
    /// permissions, rate limit and expiry in a single write. Returns the new
    /// raw key. Unknown or already revoked keys are `NotFound`.
    pub fn rotate_api_key(&self, old_raw: &str) -> Result<String, AuthError> {
        let old_hash = hash_api_key(old_raw);
        let new_raw = generate_api_key()?;
        let new_hash = hash_api_key(&new_raw);

        let name = self.commit(|keys| {
            let old = keys
                .get_mut(&old_hash)
                .filter(|info| info.is_active)
                .ok_or(AuthError::NotFound)?;
            old.is_active = false;
            let replacement = ApiKeyInfo::new(
                old.name.clone(),
                old.permissions.iter().copied(),
                old.rate_limit,
                old.expires_at,
            );
            let name = replacement.name.clone();
            keys.insert(new_hash.clone(), replacement);
            Ok(name)
        })?;

        tracing::info!(
            name = %name,
            old_hash_prefix = hash_prefix(&old_hash),
            new_hash_prefix = hash_prefix(&new_hash),
            "API key rotated"
        );
        Ok(new_raw)
    }

    /// `(hash prefix, info)` pairs, oldest key first. Raw keys are never
    /// available here.
    pub fn list_api_keys(&self) -> Vec<(String, ApiKeyInfo)> {
        let state = self.state.lock();
        let mut keys: Vec<(String, ApiKeyInfo)> = state
            .keys
            .iter()
            .map(|(hash, info)| (hash_prefix(hash).to_string(), info.clone()))
            .collect();
        drop(state);
        keys.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(&b.0)));
        keys
    }

    /// Writes the key file, if one is configured.
    pub fn save(&self) -> Result<(), AuthError> {
        let state = self.state.lock();
        self.write_key_file(state.require_auth, &state.keys)
    }

    /// Applies `change` to a copy of the key map, writes the copy, and only
    /// then swaps it in. The lock is held throughout so the file and memory
    /// never disagree about a committed change.
    fn commit<R>(
        &self,
        change: impl FnOnce(&mut HashMap<String, ApiKeyInfo>) -> Result<R, AuthError>,
    ) -> Result<R, AuthError> {
        let mut state = self.state.lock();
        let mut staged = state.keys.clone();
        let result = change(&mut staged)?;
        if staged != state.keys {
            self.write_key_file(state.require_auth, &staged)?;
            state.keys = staged;
        }
        Ok(result)
    }

    fn write_key_file(
        &self,
        require_auth: bool,
        keys: &HashMap<String, ApiKeyInfo>,
    ) -> Result<(), AuthError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = KeyFile {
            require_auth,
            keys: keys
                .iter()
                .map(|(hash, info)| (hash.clone(), info.clone()))
                .collect(),
        };
        let content = toml::to_string_pretty(&snapshot)?;
        write_private_file(path, content.as_bytes())
    }
}

impl std::fmt::Debug for ApiKeyAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthority")
            .field("keys", &self.key_count())
            .field("require_auth", &self.require_auth())
            .field("path", &self.path)
            .finish()
    }
}

// The key file may be hand-edited, so hashes are not assumed to be ASCII.
fn hash_prefix(hash: &str) -> &str {
    match hash.char_indices().nth(HASH_PREFIX_LEN) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}

fn open_identity() -> ApiKeyInfo {
    let mut info = ApiKeyInfo::new(OPEN_IDENTITY_NAME, [Permission::Admin], 0, None);
    info.created_at = DateTime::<Utc>::UNIX_EPOCH;
    info
}

/// Temp file in the same directory, owner-only permissions, then rename.
fn write_private_file(path: &Path, content: &[u8]) -> Result<(), AuthError> {
    let io_err = |source| AuthError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path).map_err(io_err)?;
    file.write_all(content).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
    }

    std::fs::rename(&temp_path, path).map_err(io_err)
}
