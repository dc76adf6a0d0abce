//! Configuration management
//!
//! All settings come from the process environment (after loading an optional
//! `.env` file). Credentials are mandatory; everything else has a default.

use jradb_common::types::Watermark;
use std::path::PathBuf;
use std::time::Duration;

use crate::category::CategoryRegistry;
use crate::error::{Result, SyncError};
use crate::storage::config::StorageConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Provider listing endpoint.
pub const DEFAULT_LIST_URL: &str = "http://jradb.jp/jradb/listDownload.do";

/// HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total HTTP request timeout in seconds (archives can be tens of MB).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Attempts per HTTP call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between attempts; multiplied by the attempt number.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

pub const DEFAULT_USER_AGENT: &str = concat!("jradb-sync/", env!("CARGO_PKG_VERSION"));

/// String whose value never shows up in `Debug` output or logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Full agent configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub provider: ProviderConfig,
    pub http: HttpConfig,
    pub registry: CategoryRegistry,
    /// Watermark used when none has been persisted yet
    pub default_watermark: Watermark,
    /// Parent directory of the per-run working directory
    pub work_dir: PathBuf,
    pub storage: StorageConfig,
}

/// JRA-DB account and endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub list_url: String,
    pub username: String,
    pub password: Secret,
}

/// HTTP transport settings shared by listing and downloads
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    /// Build a client with explicit timeouts
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(&self.user_agent)
            .build()?;
        Ok(client)
    }
}

impl SyncConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = ProviderConfig {
            list_url: get("JRADB_LIST_URL").unwrap_or_else(|| DEFAULT_LIST_URL.to_string()),
            username: required(&get, "JRADB_USER")?,
            password: Secret::new(required(&get, "JRADB_PASS")?),
        };

        let http = HttpConfig {
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "JRADB_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "JRADB_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            max_retries: parse_or(&get, "JRADB_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay: Duration::from_secs(parse_or(
                &get,
                "JRADB_RETRY_DELAY_SECS",
                DEFAULT_RETRY_DELAY_SECS,
            )?),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        };

        let registry = match get("JRADB_CATEGORIES") {
            Some(list) => CategoryRegistry::from_codes(&list)?,
            None => CategoryRegistry::default(),
        };

        let default_watermark = match get("JRADB_DEFAULT_WATERMARK") {
            Some(token) => Watermark::parse(&token)
                .map_err(|e| SyncError::Config(format!("JRADB_DEFAULT_WATERMARK: {e}")))?,
            None => Watermark::default(),
        };

        let work_dir = get("JRADB_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let storage = StorageConfig::from_lookup(&get)?;

        let config = Self {
            provider,
            http,
            registry,
            default_watermark,
            work_dir,
            storage,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let list_url = url::Url::parse(&self.provider.list_url)
            .map_err(|e| SyncError::Config(format!("JRADB_LIST_URL is not a URL: {e}")))?;
        if !matches!(list_url.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "JRADB_LIST_URL must be http(s), got {}",
                list_url.scheme()
            )));
        }

        if self.http.max_retries == 0 {
            return Err(SyncError::Config(
                "JRADB_MAX_RETRIES must be greater than 0".to_string(),
            ));
        }

        if self.http.connect_timeout.is_zero() || self.http.request_timeout.is_zero() {
            return Err(SyncError::Config("HTTP timeouts must be greater than 0".to_string()));
        }

        if self.registry.is_empty() {
            return Err(SyncError::Config("category allow-list is empty".to_string()));
        }

        Ok(())
    }
}

pub(crate) fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).ok_or_else(|| SyncError::Config(format!("{key} must be set")))
}

pub(crate) fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jradb_common::types::Category;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("JRADB_USER", "user"),
            ("JRADB_PASS", "pass"),
            ("DRIVE_FOLDER_ID", "root-folder"),
            ("GOOGLE_ACCESS_TOKEN", "token"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&minimal())).unwrap();

        assert_eq!(config.provider.list_url, DEFAULT_LIST_URL);
        assert_eq!(config.provider.username, "user");
        assert_eq!(config.provider.password.expose(), "pass");
        assert_eq!(config.http.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.default_watermark, Watermark::default());
        assert_eq!(config.registry, CategoryRegistry::default());
        assert!(matches!(&config.storage, StorageConfig::Drive(d) if d.root_folder_id == "root-folder"));
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        for missing in ["JRADB_USER", "JRADB_PASS", "DRIVE_FOLDER_ID"] {
            let pairs: Vec<_> = minimal().into_iter().filter(|(k, _)| *k != missing).collect();
            let err = SyncConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(err.is_fatal(), "{missing}");
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .map(|(k, v)| if k == "JRADB_USER" { (k, "  ") } else { (k, v) })
            .collect();
        let err = SyncConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("JRADB_USER"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = minimal();
        pairs.extend([
            ("JRADB_CATEGORIES", "JJOC,XSIN"),
            ("JRADB_DEFAULT_WATERMARK", "20200101000000"),
            ("JRADB_MAX_RETRIES", "5"),
            ("JRADB_RETRY_DELAY_SECS", "0"),
            ("JRADB_WORK_DIR", "/var/tmp/jradb"),
        ]);
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(
            config.registry.iter().collect::<Vec<_>>(),
            vec![Category::Jjoc, Category::Xsin]
        );
        assert_eq!(config.default_watermark.as_str(), "20200101000000");
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.http.retry_delay, Duration::ZERO);
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/jradb"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for (key, value) in [
            ("JRADB_CATEGORIES", "JJOC,NOPE"),
            ("JRADB_DEFAULT_WATERMARK", "yesterday"),
            ("JRADB_MAX_RETRIES", "many"),
            ("JRADB_MAX_RETRIES", "0"),
            ("JRADB_LIST_URL", "ftp://jradb.jp/list"),
        ] {
            let mut pairs = minimal();
            pairs.push((key, value));
            let err = SyncConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, SyncError::Config(_)), "{key}={value}");
        }
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = SyncConfig::from_lookup(lookup(&minimal())).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("\"pass\""));
        assert!(debug.contains("Secret(***)"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_reads_process_environment() {
        for (key, value) in minimal() {
            std::env::set_var(key, value);
        }
        std::env::set_var("JRADB_CATEGORIES", "CRES");

        let config = SyncConfig::load().unwrap();
        assert_eq!(config.registry.iter().collect::<Vec<_>>(), vec![Category::Cres]);

        for (key, _) in minimal() {
            std::env::remove_var(key);
        }
        std::env::remove_var("JRADB_CATEGORIES");
    }
}
