//! TOML Configuration File Support
//!
//! Centralized configuration loading for steward, from a TOML file at
//! `$XDG_CONFIG_HOME/steward/steward.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. `STEWARD_*` environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [platform]
//! kind = "discord"
//! api_base = "https://discord.com/api/v10"
//! token_env = "STEWARD_BOT_TOKEN"
//!
//! [storage]
//! kind = "fs"
//! root = "/var/lib/steward"
//!
//! [cache]
//! settings_ttl_secs = 300
//!
//! [interaction]
//! follow_up_timeout_secs = 60
//! archived_thread_page = 50
//! auto_archive_minutes = 10080
//! max_draw_count = 24
//!
//! [daemon]
//! socket_path = "/run/user/1000/steward/steward.sock"
//! max_connections = 8
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_SETTINGS_TTL;
use crate::collector::DEFAULT_FOLLOW_UP_TIMEOUT;
use crate::platform::DEFAULT_API_BASE;
use crate::threads::{ThreadPolicy, DEFAULT_ARCHIVED_PAGE, DEFAULT_AUTO_ARCHIVE_MINUTES};

/// Environment variable holding the bot token unless configured otherwise
pub const DEFAULT_TOKEN_ENV: &str = "STEWARD_BOT_TOKEN";

/// Largest draw count a select menu can offer
pub const MAX_SELECT_OPTIONS: usize = 25;

/// Auto-archive windows the platform accepts, in minutes
pub const AUTO_ARCHIVE_CHOICES: [u32; 4] = [60, 1_440, 4_320, 10_080];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Backend Kinds
// =============================================================================

/// Which platform client to run against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// In-process platform (local runs)
    #[default]
    Memory,
    /// Discord REST API
    Discord,
}

impl FromStr for PlatformKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "discord" => Ok(Self::Discord),
            other => Err(ConfigError::ValidationError(format!(
                "unknown platform kind '{other}' (expected memory or discord)"
            ))),
        }
    }
}

/// Which blob store to persist documents in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory, lost on exit
    #[default]
    Memory,
    /// JSON files under a root directory
    Fs,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "fs" => Ok(Self::Fs),
            other => Err(ConfigError::ValidationError(format!(
                "unknown storage kind '{other}' (expected memory or fs)"
            ))),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[platform]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformToml {
    /// `memory` or `discord`
    pub kind: Option<PlatformKind>,
    /// REST API base URL
    pub api_base: Option<String>,
    /// Name of the environment variable holding the bot token
    pub token_env: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// `[storage]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageToml {
    /// `memory` or `fs`
    pub kind: Option<StorageKind>,
    /// Root directory for the `fs` store
    pub root: Option<String>,
}

/// `[cache]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheToml {
    /// Settings cache time-to-live in seconds
    pub settings_ttl_secs: Option<u64>,
}

/// `[interaction]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionToml {
    /// Listening window for follow-up selections
    pub follow_up_timeout_secs: Option<u64>,
    /// Archived threads scanned when resolving a log thread
    pub archived_thread_page: Option<usize>,
    /// Auto-archive window for created threads
    pub auto_archive_minutes: Option<u32>,
    /// Highest draw count offered
    pub max_draw_count: Option<usize>,
}

/// `[daemon]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonToml {
    /// Unix socket the bridge connects to
    pub socket_path: Option<String>,
    /// Maximum simultaneous bridge connections
    pub max_connections: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardToml {
    /// Platform section
    pub platform: PlatformToml,
    /// Storage section
    pub storage: StorageToml,
    /// Cache section
    pub cache: CacheToml,
    /// Interaction section
    pub interaction: InteractionToml,
    /// Daemon section
    pub daemon: DaemonToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Platform client settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformSettings {
    /// Client kind
    pub kind: PlatformKind,
    /// REST API base URL
    pub api_base: String,
    /// Environment variable holding the bot token
    pub token_env: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

/// Blob store settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageSettings {
    /// Store kind
    pub kind: StorageKind,
    /// Root directory for the `fs` store
    pub root: PathBuf,
}

/// Interaction behavior settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionSettings {
    /// Listening window for follow-up selections
    pub follow_up_timeout: Duration,
    /// Archived threads scanned when resolving a log thread
    pub archived_thread_page: usize,
    /// Auto-archive window for created threads
    pub auto_archive_minutes: u32,
    /// Highest draw count offered
    pub max_draw_count: usize,
}

impl InteractionSettings {
    /// Thread resolution policy derived from these settings
    #[must_use]
    pub fn thread_policy(&self) -> ThreadPolicy {
        ThreadPolicy {
            archived_page: self.archived_thread_page,
            auto_archive_minutes: self.auto_archive_minutes,
        }
    }
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            follow_up_timeout: DEFAULT_FOLLOW_UP_TIMEOUT,
            archived_thread_page: DEFAULT_ARCHIVED_PAGE,
            auto_archive_minutes: DEFAULT_AUTO_ARCHIVE_MINUTES,
            max_draw_count: 24,
        }
    }
}

/// Daemon settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Unix socket the bridge connects to
    pub socket_path: PathBuf,
    /// Maximum simultaneous bridge connections
    pub max_connections: usize,
}

/// Effective configuration
#[derive(Clone, Debug)]
pub struct StewardConfig {
    /// Platform client
    pub platform: PlatformSettings,
    /// Blob store
    pub storage: StorageSettings,
    /// Settings cache time-to-live
    pub settings_ttl: Duration,
    /// Interaction behavior
    pub interaction: InteractionSettings,
    /// Daemon
    pub daemon: DaemonSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for StewardConfig {
    fn default() -> Self {
        Self {
            platform: PlatformSettings {
                kind: PlatformKind::default(),
                api_base: DEFAULT_API_BASE.to_string(),
                token_env: DEFAULT_TOKEN_ENV.to_string(),
                request_timeout: Duration::from_secs(15),
            },
            storage: StorageSettings {
                kind: StorageKind::default(),
                root: default_storage_root(),
            },
            settings_ttl: DEFAULT_SETTINGS_TTL,
            interaction: InteractionSettings::default(),
            daemon: DaemonSettings {
                socket_path: default_socket_path(),
                max_connections: 8,
            },
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl StewardConfig {
    /// Configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the platform or the UI cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        let i = &self.interaction;
        if i.follow_up_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "interaction.follow_up_timeout_secs must be positive".into(),
            ));
        }
        if !(1..=MAX_SELECT_OPTIONS).contains(&i.max_draw_count) {
            return Err(ConfigError::ValidationError(format!(
                "interaction.max_draw_count must be within 1..={MAX_SELECT_OPTIONS}"
            )));
        }
        if !(1..=100).contains(&i.archived_thread_page) {
            return Err(ConfigError::ValidationError(
                "interaction.archived_thread_page must be within 1..=100".into(),
            ));
        }
        if !AUTO_ARCHIVE_CHOICES.contains(&i.auto_archive_minutes) {
            return Err(ConfigError::ValidationError(format!(
                "interaction.auto_archive_minutes must be one of {AUTO_ARCHIVE_CHOICES:?}"
            )));
        }
        if self.daemon.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "daemon.max_connections must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// `$XDG_CONFIG_HOME/steward/steward.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("steward").join("steward.toml"))
}

/// `$XDG_RUNTIME_DIR/steward/steward.sock`, falling back to the temp dir
#[must_use]
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("steward")
        .join("steward.sock")
}

/// `$XDG_DATA_HOME/steward`, falling back to the temp dir
#[must_use]
pub fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("steward")
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<StewardConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if an
/// environment variable carries an unusable value.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<StewardConfig, ConfigError> {
    let mut config = StewardConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: StewardToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut StewardConfig, toml: &StewardToml) {
    if let Some(kind) = toml.platform.kind {
        config.platform.kind = kind;
    }
    if let Some(ref base) = toml.platform.api_base {
        config.platform.api_base = base.clone();
    }
    if let Some(ref name) = toml.platform.token_env {
        config.platform.token_env = name.clone();
    }
    if let Some(secs) = toml.platform.request_timeout_secs {
        config.platform.request_timeout = Duration::from_secs(secs);
    }

    if let Some(kind) = toml.storage.kind {
        config.storage.kind = kind;
    }
    if let Some(ref root) = toml.storage.root {
        config.storage.root = PathBuf::from(root);
    }

    if let Some(secs) = toml.cache.settings_ttl_secs {
        config.settings_ttl = Duration::from_secs(secs);
    }

    if let Some(secs) = toml.interaction.follow_up_timeout_secs {
        config.interaction.follow_up_timeout = Duration::from_secs(secs);
    }
    if let Some(page) = toml.interaction.archived_thread_page {
        config.interaction.archived_thread_page = page;
    }
    if let Some(minutes) = toml.interaction.auto_archive_minutes {
        config.interaction.auto_archive_minutes = minutes;
    }
    if let Some(max) = toml.interaction.max_draw_count {
        config.interaction.max_draw_count = max;
    }

    if let Some(ref path) = toml.daemon.socket_path {
        config.daemon.socket_path = PathBuf::from(path);
    }
    if let Some(max) = toml.daemon.max_connections {
        config.daemon.max_connections = max;
    }
}

/// Apply `STEWARD_*` overrides read through `lookup`
fn apply_env_config<F>(config: &mut StewardConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    if let Some(kind) = lookup("STEWARD_PLATFORM") {
        config.platform.kind = kind.parse()?;
        touched = true;
    }
    if let Some(base) = lookup("STEWARD_API_BASE") {
        config.platform.api_base = base;
        touched = true;
    }
    if let Some(kind) = lookup("STEWARD_STORAGE") {
        config.storage.kind = kind.parse()?;
        touched = true;
    }
    if let Some(root) = lookup("STEWARD_STORAGE_ROOT") {
        config.storage.root = PathBuf::from(root);
        touched = true;
    }
    if let Some(secs) = lookup("STEWARD_SETTINGS_TTL").and_then(|v| v.parse::<u64>().ok()) {
        config.settings_ttl = Duration::from_secs(secs);
        touched = true;
    }
    if let Some(secs) = lookup("STEWARD_FOLLOW_UP_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
        config.interaction.follow_up_timeout = Duration::from_secs(secs);
        touched = true;
    }
    if let Some(path) = lookup("STEWARD_SOCKET") {
        config.daemon.socket_path = PathBuf::from(path);
        touched = true;
    }
    if let Some(max) = lookup("STEWARD_MAX_CONNECTIONS").and_then(|v| v.parse::<usize>().ok()) {
        config.daemon.max_connections = max;
        touched = true;
    }

    if touched {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,
    /// Storage root override (implies the `fs` store)
    pub storage_root: Option<PathBuf>,
    /// Platform kind override
    pub platform: Option<PlatformKind>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set storage root override
    #[must_use]
    pub fn with_storage_root(mut self, root: PathBuf) -> Self {
        self.storage_root = Some(root);
        self
    }

    /// Set platform override
    #[must_use]
    pub fn with_platform(mut self, kind: PlatformKind) -> Self {
        self.platform = Some(kind);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut StewardConfig) {
        if self.socket_path.is_some() || self.storage_root.is_some() || self.platform.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref path) = self.socket_path {
            config.daemon.socket_path = path.clone();
        }
        if let Some(ref root) = self.storage_root {
            config.storage.kind = StorageKind::Fs;
            config.storage.root = root.clone();
        }
        if let Some(kind) = self.platform {
            config.platform.kind = kind;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StewardConfig::default();

        assert_eq!(config.platform.kind, PlatformKind::Memory);
        assert_eq!(config.platform.token_env, "STEWARD_BOT_TOKEN");
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.interaction.follow_up_timeout, Duration::from_secs(60));
        assert_eq!(config.interaction.archived_thread_page, 50);
        assert_eq!(config.interaction.auto_archive_minutes, 10_080);
        assert_eq!(config.interaction.max_draw_count, 24);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[platform]
kind = "discord"
token_env = "MY_TOKEN"

[storage]
kind = "fs"
root = "/srv/steward"

[interaction]
follow_up_timeout_secs = 30
max_draw_count = 10
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.platform.kind, PlatformKind::Discord);
        assert_eq!(config.platform.token_env, "MY_TOKEN");
        assert_eq!(config.storage.kind, StorageKind::Fs);
        assert_eq!(config.storage.root, PathBuf::from("/srv/steward"));
        assert_eq!(config.interaction.follow_up_timeout, Duration::from_secs(30));
        assert_eq!(config.interaction.max_draw_count, 10);
        // Untouched sections keep defaults
        assert_eq!(config.interaction.archived_thread_page, 50);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config =
            load_config_from_path(Some(PathBuf::from("/nonexistent/steward.toml"))).unwrap();
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[platform\nkind = ").unwrap();
        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_kind_in_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nkind = \"s3\"").unwrap();
        assert!(load_config_from_path(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = StewardConfig::default();
        apply_toml_config(
            &mut config,
            &StewardToml {
                storage: StorageToml {
                    kind: Some(StorageKind::Fs),
                    root: Some("/from/file".into()),
                },
                ..StewardToml::default()
            },
        );
        config.set_source(ConfigSource::File);

        apply_env_config(
            &mut config,
            env(&[
                ("STEWARD_STORAGE_ROOT", "/from/env"),
                ("STEWARD_FOLLOW_UP_TIMEOUT", "5"),
                ("STEWARD_SETTINGS_TTL", "not-a-number"),
            ]),
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/from/env"));
        assert_eq!(config.interaction.follow_up_timeout, Duration::from_secs(5));
        assert_eq!(config.settings_ttl, DEFAULT_SETTINGS_TTL);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_rejects_unknown_platform() {
        let mut config = StewardConfig::default();
        let result = apply_env_config(&mut config, env(&[("STEWARD_PLATFORM", "slack")]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_cli_overrides_everything() {
        let mut config = StewardConfig::default();
        apply_env_config(&mut config, env(&[("STEWARD_SOCKET", "/env.sock")])).unwrap();

        ConfigOverrides::new()
            .with_socket_path(PathBuf::from("/cli.sock"))
            .with_storage_root(PathBuf::from("/cli/data"))
            .apply(&mut config);

        assert_eq!(config.daemon.socket_path, PathBuf::from("/cli.sock"));
        assert_eq!(config.storage.kind, StorageKind::Fs);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = StewardConfig::default();
        config.interaction.max_draw_count = 30;
        assert!(config.validate().is_err());

        let mut config = StewardConfig::default();
        config.interaction.auto_archive_minutes = 90;
        assert!(config.validate().is_err());

        let mut config = StewardConfig::default();
        config.interaction.follow_up_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
    }
}
