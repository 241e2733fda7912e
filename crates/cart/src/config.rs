//! Cart sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_SERVER_URL` - Base URL of the CMS backend (e.g., <https://shop.example.com>)
//!
//! ## Optional
//! - `CART_API_TOKEN` - API token for the current user (sent as `Authorization: JWT ...`)
//! - `CART_DEBOUNCE_MS` - Persistence quiescence window in milliseconds (default: 1000)
//! - `CART_STORAGE_DIR` - Directory for the local cart draft (default: .cartsync)
//! - `CART_PRODUCT_CACHE_TTL_SECS` - Product snapshot cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default persistence quiescence window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Cart sync configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// CMS backend connection settings
    pub server: ServerConfig,
    /// Persistence debounce window
    pub debounce: Duration,
    /// Directory holding the local cart draft
    pub storage_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// CMS backend connection settings.
///
/// Implements `Debug` manually to redact the API token.
#[derive(Clone)]
pub struct ServerConfig {
    /// Base URL of the backend
    pub base_url: Url,
    /// Token of the signed-in user, if any
    pub api_token: Option<SecretString>,
    /// How long fetched product snapshots stay cached
    pub product_cache_ttl: Duration,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("product_cache_ttl", &self.product_cache_ttl)
            .finish()
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig::from_env()?;
        let debounce_ms = parse_env_or_default("CART_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let debounce = Duration::from_millis(debounce_ms);
        let storage_dir = PathBuf::from(get_env_or_default("CART_STORAGE_DIR", ".cartsync"));
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            server,
            debounce,
            storage_dir,
            sentry_dsn,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_base_url("CART_SERVER_URL", &get_required_env("CART_SERVER_URL")?)?;
        let api_token = get_optional_env("CART_API_TOKEN")
            .map(|token| {
                validate_token_entropy(&token, "CART_API_TOKEN")?;
                Ok(SecretString::from(token))
            })
            .transpose()?;
        let product_cache_ttl =
            Duration::from_secs(parse_env_or_default("CART_PRODUCT_CACHE_TTL_SECS", 300)?);

        Ok(Self {
            base_url,
            api_token,
            product_cache_ttl,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a numeric environment variable, falling back to a default when unset.
fn parse_env_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse and check a backend base URL.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "URL must have a host".to_string(),
        ));
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject tokens whose entropy is too low to have been issued by the backend.
///
/// The token's text is not otherwise inspected; an issued JWT may contain
/// any substring.
fn validate_token_entropy(token: &str, var_name: &str) -> Result<(), ConfigError> {
    let entropy = shannon_entropy(token);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by the backend."
            ),
        ));
    }

    Ok(())
}
