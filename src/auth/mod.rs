//! API key authentication, permissions and per-key rate limits.

pub mod apikey;
pub mod authority;
pub mod error;
pub mod rate_limit;

pub use apikey::{
    API_KEY_PREFIX, ApiKeyInfo, Permission, generate_api_key, has_permission, hash_api_key,
};
pub use authority::{ApiKeyAuthority, AuthMode, HASH_PREFIX_LEN, ValidatedKey};
pub use error::AuthError;
pub use rate_limit::RateLimiter;
