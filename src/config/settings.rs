//! Configuration settings for the token pipeline.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::MasterSecret;
use crate::error::{ConfigError, TokenError};

/// Main configuration structure.
///
/// Every section rejects unknown keys so a misspelled option fails loudly.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub token: TokenSettings,
    pub security: SecurityConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Protection profile; selects how many cipher layers derived recipes use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// One layer.
    Performance,
    /// Two layers.
    #[default]
    Standard,
    /// Three layers.
    High,
}

impl Profile {
    pub fn layer_count(self) -> u8 {
        match self {
            Profile::Performance => 1,
            Profile::Standard => 2,
            Profile::High => 3,
        }
    }
}

/// How a bound location is compared against the presented one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPolicy {
    #[default]
    Exact,
    /// Accept a different location within the same region prefix
    /// (e.g. `US_West` and `US_East`).
    Drift,
}

/// Token pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenSettings {
    pub profile: Profile,
    /// Compare bound locations during verification.
    pub enable_geo: bool,
    /// Compare bound device fingerprints during verification.
    pub enable_device_fingerprint: bool,
    /// Issuances per key per minute; 0 disables rate limiting.
    pub rate_limit_per_minute: usize,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    pub recipe_rotation_interval_seconds: u64,
    /// Maximum number of recipe versions retained.
    pub recipe_cache_size: usize,
    /// Refresh only when fewer than this many seconds remain.
    pub refresh_window_seconds: u64,
    pub location_policy: LocationPolicy,
    pub max_batch_size: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            enable_geo: true,
            enable_device_fingerprint: true,
            rate_limit_per_minute: 60,
            default_ttl_seconds: 3600,
            max_ttl_seconds: 86_400,
            recipe_rotation_interval_seconds: 3600,
            recipe_cache_size: 24,
            refresh_window_seconds: 900,
            location_policy: LocationPolicy::default(),
            max_batch_size: 50,
        }
    }
}

impl TokenSettings {
    /// Validate the token settings.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.default_ttl_seconds == 0 {
            return Err(TokenError::invalid_config("default_ttl_seconds must be positive"));
        }
        if self.default_ttl_seconds > self.max_ttl_seconds {
            return Err(TokenError::invalid_config(format!(
                "default_ttl_seconds {} exceeds max_ttl_seconds {}",
                self.default_ttl_seconds, self.max_ttl_seconds
            )));
        }
        if self.recipe_rotation_interval_seconds == 0 {
            return Err(TokenError::invalid_config(
                "recipe_rotation_interval_seconds must be positive",
            ));
        }
        if self.recipe_cache_size == 0 {
            return Err(TokenError::invalid_config("recipe_cache_size must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(TokenError::invalid_config("max_batch_size must be positive"));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_seconds)
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Path to the master secret file.
    pub secret_path: PathBuf,
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether audit records are written.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the JSON lines audit log.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
    /// Records buffered before new ones are dropped.
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/lumo/token-audit.log")
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token
            .validate()
            .map_err(|e| ConfigError::invalid(e.to_string()))?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::invalid("audit queue_capacity must be positive"));
        }

        Ok(())
    }
}

/// Load the master secret from a file.
///
/// Security: Verifies the file has restrictive permissions (0600 or 0400)
/// before loading to prevent the secret from being readable by other users.
/// Surrounding whitespace is trimmed.
pub fn load_secret(path: &Path) -> Result<MasterSecret, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::Secret {
        message: format!(
            "Failed to read secret metadata from {}: {}",
            path.display(),
            e
        ),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        // Group and world bits must all be zero
        if mode & 0o077 != 0 {
            return Err(ConfigError::Secret {
                message: format!(
                    "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                    path.display(),
                    mode & 0o777
                ),
            });
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let raw = std::fs::read(path).map_err(|e| ConfigError::Secret {
        message: format!("Failed to read secret from {}: {}", path.display(), e),
    })?;

    let trimmed = raw.trim_ascii().to_vec();
    MasterSecret::new(trimmed).map_err(|e| ConfigError::Secret {
        message: e.to_string(),
    })
}
