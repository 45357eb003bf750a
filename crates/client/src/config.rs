//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BUGDESK_API_URL` - Base URL of the remote bug-tracking API
//!
//! ## Optional
//! - `BUGDESK_DATA_DIR` - Directory for persisted session state
//!   (default: platform local data dir + `/bugdesk`)
//! - `BUGDESK_PAGE_SIZE` - Rows per listing page (default: 10)
//! - `BUGDESK_CACHE_CAPACITY` - Maximum cached query entries (default: 500)
//! - `BUGDESK_CACHE_RETENTION_SECS` - Idle time before an entry is evicted (default: 300)
//! - `BUGDESK_STALE_AFTER_SECS` - Age after which a cached entry is revalidated (default: 30)
//! - `BUGDESK_SEARCH_DEBOUNCE_MS` - Search input quiescence window (default: 300)
//! - `BUGDESK_REQUEST_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_CACHE_CAPACITY: u64 = 500;
const DEFAULT_CACHE_RETENTION_SECS: u64 = 300;
const DEFAULT_STALE_AFTER_SECS: u64 = 30;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("No data directory available; set BUGDESK_DATA_DIR")]
    NoDataDir,
}

/// Bugdesk client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote API (e.g. `https://bugs.example.com/api`)
    pub api_url: Url,
    /// Directory holding the persisted session file
    pub data_dir: PathBuf,
    /// Rows per listing page
    pub page_size: u32,
    /// Cache sizing and freshness
    pub cache: CacheConfig,
    /// Quiescence window for search input
    pub search_debounce: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Retention and freshness policy of the resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries kept.
    pub max_capacity: u64,
    /// Entries not read for this long are evicted.
    pub retention: Duration,
    /// Successful entries older than this are revalidated on the next query.
    pub stale_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_CACHE_CAPACITY,
            retention: Duration::from_secs(DEFAULT_CACHE_RETENTION_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the API URL.
    ///
    /// The data directory defaults to the platform data dir, or the current
    /// directory when none exists.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            data_dir: default_data_dir().unwrap_or_else(|| PathBuf::from(".bugdesk")),
            page_size: DEFAULT_PAGE_SIZE,
            cache: CacheConfig::default(),
            search_debounce: Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            sentry_dsn: None,
        }
    }

    /// Override the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = get_required(&lookup, "BUGDESK_API_URL")?;
        let api_url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("BUGDESK_API_URL".to_string(), e.to_string())
        })?;

        let data_dir = match lookup("BUGDESK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let page_size: u32 = get_parsed_or_default(&lookup, "BUGDESK_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BUGDESK_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cache = CacheConfig {
            max_capacity: get_parsed_or_default(
                &lookup,
                "BUGDESK_CACHE_CAPACITY",
                DEFAULT_CACHE_CAPACITY,
            )?,
            retention: Duration::from_secs(get_parsed_or_default(
                &lookup,
                "BUGDESK_CACHE_RETENTION_SECS",
                DEFAULT_CACHE_RETENTION_SECS,
            )?),
            stale_after: Duration::from_secs(get_parsed_or_default(
                &lookup,
                "BUGDESK_STALE_AFTER_SECS",
                DEFAULT_STALE_AFTER_SECS,
            )?),
        };

        let search_debounce = Duration::from_millis(get_parsed_or_default(
            &lookup,
            "BUGDESK_SEARCH_DEBOUNCE_MS",
            DEFAULT_SEARCH_DEBOUNCE_MS,
        )?);
        let request_timeout = Duration::from_secs(get_parsed_or_default(
            &lookup,
            "BUGDESK_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        Ok(Self {
            api_url,
            data_dir,
            page_size,
            cache,
            search_debounce,
            request_timeout,
            sentry_dsn: lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
        })
    }

    /// Path of the persisted session file.
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Platform data directory for Bugdesk.
fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("bugdesk"))
}

/// Get a required variable.
fn get_required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a variable parsed into `T`, or a default when unset.
fn get_parsed_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_url() {
        let err = ClientConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "BUGDESK_API_URL"));
    }

    #[test]
    fn test_defaults_applied() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("BUGDESK_API_URL", "http://localhost:5000/api"),
            ("BUGDESK_DATA_DIR", "/tmp/bugdesk-test"),
        ]))
        .unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.search_debounce, Duration::from_millis(300));
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(
            config.session_file(),
            PathBuf::from("/tmp/bugdesk-test/session.json")
        );
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_overrides_parsed() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("BUGDESK_API_URL", "http://localhost:5000/api"),
            ("BUGDESK_DATA_DIR", "/tmp/x"),
            ("BUGDESK_PAGE_SIZE", "25"),
            ("BUGDESK_STALE_AFTER_SECS", "0"),
            ("BUGDESK_SEARCH_DEBOUNCE_MS", "150"),
        ]))
        .unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.cache.stale_after, Duration::ZERO);
        assert_eq!(config.search_debounce, Duration::from_millis(150));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("BUGDESK_API_URL", "not a url"),
            ("BUGDESK_DATA_DIR", "/tmp/x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "BUGDESK_API_URL"));

        let err = ClientConfig::from_lookup(lookup_from(&[
            ("BUGDESK_API_URL", "http://localhost"),
            ("BUGDESK_DATA_DIR", "/tmp/x"),
            ("BUGDESK_PAGE_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "BUGDESK_PAGE_SIZE"));
    }
}
