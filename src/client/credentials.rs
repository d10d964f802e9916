//! API key handling
//!
//! The API key is an opaque credential presented on every request. It is
//! taken from configuration when set, otherwise from the environment.
//!
//! # Example
//!
//! ```
//! use resumable_uploadr::client::{ApiKey, ApiKeyProvider};
//!
//! let key = ApiKeyProvider::resolve(Some("secret-key")).unwrap();
//! assert_eq!(key.expose(), "secret-key");
//! assert_eq!(format!("{:?}", key), "ApiKey(***)");
//! ```

use std::fmt;
use thiserror::Error;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "RESUMABLE_UPLOAD_API_KEY";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing API key: set client.api_key or {0}")]
    MissingApiKey(&'static str),

    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),
}

/// Opaque API key
///
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the request header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Resolves the API key from configuration or the environment
pub struct ApiKeyProvider;

impl ApiKeyProvider {
    /// Resolve the key, preferring an explicitly configured value
    pub fn resolve(configured: Option<&str>) -> Result<ApiKey, CredentialsError> {
        let key = match configured.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => std::env::var(API_KEY_ENV)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .ok_or(CredentialsError::MissingApiKey(API_KEY_ENV))?,
        };

        // Header values cannot carry control characters
        if key.chars().any(|c| c.is_control()) {
            return Err(CredentialsError::InvalidApiKey(
                "key contains control characters".into(),
            ));
        }

        Ok(ApiKey(key))
    }
}
