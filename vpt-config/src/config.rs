// vpt-config/src/config.rs
// ============================================================================
// Module: Configuration Loading & Validation
// Description: Typed defaults, TOML file overlay, and environment variable
//              overlay for the §6.6 configuration surface.
// Purpose: Produce one validated `VptConfig` the Server and Host processes
//          build their runtime state from.
// Dependencies: serde, toml, std::env
// ============================================================================

//! ## Overview
//! Resolution order, lowest to highest precedence: typed defaults, then an
//! optional TOML file (`VPT_CONFIG` env var, falling back to `./vpt.toml` if
//! present), then environment variables. Missing optional inputs (AI
//! provider key, Redis queue, object storage credentials) are left `None`:
//! the features that need them fail at the point of use, not at load time,
//! since none of §6.6's env inputs are mandatory for every deployment shape.

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const CONFIG_ENV_VAR: &str = "VPT_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "vpt.toml";
/// Fail closed on implausibly large config files rather than parse whatever
/// a misconfigured deployment happens to mount.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

const DEFAULT_SERVER_URL: &str = "0.0.0.0:8080";
const DEFAULT_HOST_URL: &str = "0.0.0.0:8070";
const DEFAULT_HLS_SEGMENT_DURATION_SECS: u64 = 2;
const DEFAULT_PROXY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_MISSED_THRESHOLD: u32 = 3;
const DEFAULT_STATUS_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SQLITE_PATH: &str = "vpt.sqlite3";

// ============================================================================
// SECTION: Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("config file {path} is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Object Storage
// ============================================================================

/// Credentials for the R2/S3-compatible object store that capture producers
/// upload evidence to (§1, §6.6). Entirely optional: a deployment that
/// disables media evidence upload leaves all fields unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl ObjectStorageConfig {
    fn merge_env(&mut self) {
        merge_opt(&mut self.endpoint, env::var("OBJECT_STORAGE_ENDPOINT").ok());
        merge_opt(&mut self.bucket, env::var("OBJECT_STORAGE_BUCKET").ok());
        merge_opt(&mut self.access_key_id, env::var("OBJECT_STORAGE_ACCESS_KEY_ID").ok());
        merge_opt(&mut self.secret_access_key, env::var("OBJECT_STORAGE_SECRET_ACCESS_KEY").ok());
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.bucket.is_some() && self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ============================================================================
// SECTION: Raw (partial) overlay shape
// ============================================================================

/// The TOML file shape: every field optional, since the file is only one of
/// three overlay layers.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    server_url: Option<String>,
    host_url: Option<String>,
    hls_segment_duration_secs: Option<u64>,
    openrouter_api_key: Option<String>,
    upstash_redis_rest_url: Option<String>,
    upstash_redis_rest_token: Option<String>,
    proxy_timeout_ms: Option<u64>,
    heartbeat_interval_secs: Option<u64>,
    heartbeat_missed_threshold: Option<u32>,
    status_poll_interval_ms: Option<u64>,
    sqlite_path: Option<PathBuf>,
    #[serde(default)]
    object_storage: ObjectStorageConfig,
}

// ============================================================================
// SECTION: VptConfig
// ============================================================================

/// Fully resolved, validated configuration (§6.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VptConfig {
    /// Bind/publish address for the stateless API server.
    pub server_url: String,
    /// Bind/publish address for a host agent process.
    pub host_url: String,
    /// HLS segment duration in seconds; AV capture drivers align their
    /// polling window to this.
    pub hls_segment_duration_secs: u64,
    pub openrouter_api_key: Option<String>,
    pub upstash_redis_rest_url: Option<String>,
    pub upstash_redis_rest_token: Option<String>,
    /// Default timeout for a proxied server→host control call (§4.5).
    pub proxy_timeout_ms: u64,
    /// Host heartbeat cadence (§4.5, §5).
    pub heartbeat_interval_secs: u64,
    /// Missed heartbeats before a host and its devices are marked unavailable.
    pub heartbeat_missed_threshold: u32,
    /// Server's polling cadence against a host's async task status endpoint.
    pub status_poll_interval_ms: u64,
    /// Path to the embedded SQLite persistence store.
    pub sqlite_path: PathBuf,
    pub object_storage: ObjectStorageConfig,
}

impl Default for VptConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            host_url: DEFAULT_HOST_URL.to_string(),
            hls_segment_duration_secs: DEFAULT_HLS_SEGMENT_DURATION_SECS,
            openrouter_api_key: None,
            upstash_redis_rest_url: None,
            upstash_redis_rest_token: None,
            proxy_timeout_ms: DEFAULT_PROXY_TIMEOUT_MS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_missed_threshold: DEFAULT_HEARTBEAT_MISSED_THRESHOLD,
            status_poll_interval_ms: DEFAULT_STATUS_POLL_INTERVAL_MS,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            object_storage: ObjectStorageConfig::default(),
        }
    }
}

impl VptConfig {
    /// Loads configuration: defaults, overlaid by an optional TOML file,
    /// overlaid by environment variables. Fails closed on a malformed or
    /// oversized config file rather than falling back to defaults silently.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when an explicitly named config file cannot
    /// be read or parsed, or when the merged result fails [`Self::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
        let path = explicit.clone().or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
            default_path.exists().then_some(default_path)
        });

        let mut raw = match path {
            Some(path) => read_raw(&path)?,
            None => RawConfig::default(),
        };
        raw.merge_env();

        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();
        let mut object_storage = raw.object_storage;
        object_storage.merge_env();
        Self {
            server_url: env_or(raw.server_url, "SERVER_URL", defaults.server_url),
            host_url: env_or(raw.host_url, "HOST_URL", defaults.host_url),
            hls_segment_duration_secs: env_or_parsed(raw.hls_segment_duration_secs, "HLS_SEGMENT_DURATION", defaults.hls_segment_duration_secs),
            openrouter_api_key: env_or_opt(raw.openrouter_api_key, "OPENROUTER_API_KEY"),
            upstash_redis_rest_url: env_or_opt(raw.upstash_redis_rest_url, "UPSTASH_REDIS_REST_URL"),
            upstash_redis_rest_token: env_or_opt(raw.upstash_redis_rest_token, "UPSTASH_REDIS_REST_TOKEN"),
            proxy_timeout_ms: raw.proxy_timeout_ms.unwrap_or(defaults.proxy_timeout_ms),
            heartbeat_interval_secs: raw.heartbeat_interval_secs.unwrap_or(defaults.heartbeat_interval_secs),
            heartbeat_missed_threshold: raw.heartbeat_missed_threshold.unwrap_or(defaults.heartbeat_missed_threshold),
            status_poll_interval_ms: raw.status_poll_interval_ms.unwrap_or(defaults.status_poll_interval_ms),
            sqlite_path: raw.sqlite_path.unwrap_or(defaults.sqlite_path),
            object_storage,
        }
    }

    /// Fail-closed validation: every duration/threshold must be positive.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first broken field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hls_segment_duration_secs == 0 {
            return Err(ConfigError::Invalid("hls_segment_duration_secs must be > 0".into()));
        }
        if self.proxy_timeout_ms == 0 {
            return Err(ConfigError::Invalid("proxy_timeout_ms must be > 0".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_interval_secs must be > 0".into()));
        }
        if self.heartbeat_missed_threshold == 0 {
            return Err(ConfigError::Invalid("heartbeat_missed_threshold must be > 0".into()));
        }
        if self.status_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("status_poll_interval_ms must be > 0".into()));
        }
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url must not be empty".into()));
        }
        if self.host_url.trim().is_empty() {
            return Err(ConfigError::Invalid("host_url must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    /// Window after which a host is considered unavailable: missed-threshold
    /// consecutive heartbeat intervals with no heartbeat received (§4.5, §5).
    #[must_use]
    pub fn heartbeat_unavailable_after(&self) -> Duration {
        self.heartbeat_interval() * self.heartbeat_missed_threshold
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let metadata = fs::metadata(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::FileTooLarge { path: path.to_path_buf(), size: metadata.len(), limit: MAX_CONFIG_FILE_SIZE });
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

fn merge_opt(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *slot = Some(value);
    }
}

fn env_or(raw: Option<String>, var: &str, default: String) -> String {
    env::var(var).ok().or(raw).unwrap_or(default)
}

fn env_or_opt(raw: Option<String>, var: &str) -> Option<String> {
    env::var(var).ok().or(raw)
}

fn env_or_parsed<T: std::str::FromStr>(raw: Option<T>, var: &str, default: T) -> T {
    env::var(var).ok().and_then(|value| value.parse().ok()).or(raw).unwrap_or(default)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(VptConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_hls_duration_rejected() {
        let mut config = VptConfig::default();
        config.hls_segment_duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overlay_wins_over_file() {
        // SAFETY: test runs single-threaded within this process's test harness
        // and restores the variable afterward.
        unsafe { env::set_var("SERVER_URL", "1.2.3.4:9999") };
        let raw = RawConfig { server_url: Some("from-file:1".into()), ..Default::default() };
        let config = VptConfig::from_raw(raw);
        unsafe { env::remove_var("SERVER_URL") };
        assert_eq!(config.server_url, "1.2.3.4:9999");
    }

    #[test]
    fn file_value_used_when_env_absent() {
        unsafe { env::remove_var("HOST_URL") };
        let raw = RawConfig { host_url: Some("from-file:2".into()), ..Default::default() };
        let config = VptConfig::from_raw(raw);
        assert_eq!(config.host_url, "from-file:2");
    }

    #[test]
    fn heartbeat_unavailable_after_multiplies_interval_by_threshold() {
        let config = VptConfig::default();
        assert_eq!(config.heartbeat_unavailable_after(), Duration::from_secs(30));
    }

    #[test]
    fn object_storage_not_configured_by_default() {
        assert!(!VptConfig::default().object_storage.is_configured());
    }
}
