//! TOML-based configuration for the Pen Remote server.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\PenRemote\config.toml`
//! - Linux:    `~/.config/penremote/config.toml`
//! - macOS:    `~/Library/Application Support/PenRemote/config.toml`
//!
//! Every field has a default, so a missing file, an empty file, or a file
//! written by an older version all load cleanly:
//!
//! ```toml
//! [service]
//! name = "Drawing Pen Remote"
//! identifier = "00001101-0000-1000-8000-00805F9B34FB"
//! autostart = true
//!
//! [network]
//! bind_address = "0.0.0.0:0"
//! discovery_port = 24850
//! max_connections = 8
//!
//! [server]
//! log_level = "info"
//! control_format = "text"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::lifecycle::{ServerSettings, DEFAULT_COMMENT};
use crate::infrastructure::control::ControlFormat;
use crate::infrastructure::discovery::DEFAULT_DISCOVERY_PORT;

/// Service name advertised when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "Drawing Pen Remote";

/// Service class identifier the remote control looks for.
pub const DEFAULT_SERVICE_IDENTIFIER: &str = "00001101-0000-1000-8000-00805F9B34FB";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field parsed as TOML but holds an unusable value.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// What the server advertises.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// UUID text; validated when the server starts.
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default = "default_comment")]
    pub comment: String,
    /// Start the server as soon as the process is up.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

/// Sockets and limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Listening address.  Port `0` lets the OS pick one.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
    /// Longest single wait for a connection before the stop flag is checked.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_dispatch_queue_depth")]
    pub dispatch_queue_depth: usize,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub control_format: ControlFormat,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}
fn default_identifier() -> String {
    DEFAULT_SERVICE_IDENTIFIER.to_string()
}
fn default_comment() -> String {
    DEFAULT_COMMENT.to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0:0".to_string()
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_accept_poll_ms() -> u64 {
    1000
}
fn default_max_connections() -> usize {
    crate::application::registry::DEFAULT_MAX_CONNECTIONS
}
fn default_max_line_length() -> usize {
    pen_core::protocol::framing::DEFAULT_MAX_LINE_LEN
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
fn default_dispatch_queue_depth() -> usize {
    crate::application::dispatch::DEFAULT_DISPATCH_QUEUE_DEPTH
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            identifier: default_identifier(),
            comment: default_comment(),
            autostart: default_true(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            discovery_port: default_discovery_port(),
            discovery_enabled: default_true(),
            accept_poll_ms: default_accept_poll_ms(),
            max_connections: default_max_connections(),
            max_line_length: default_max_line_length(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            dispatch_queue_depth: default_dispatch_queue_depth(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            control_format: ControlFormat::default(),
        }
    }
}

// ── Runtime views ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Parses `network.bind_address`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if it is not `ip:port`.
    pub fn bind_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.network
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "network.bind_address",
                value: self.network.bind_address.clone(),
            })
    }

    /// The lifecycle's view of this configuration.
    ///
    /// Zero limits and depths are raised to one so a bad file cannot build a
    /// server that refuses everything or a channel that cannot exist.
    pub fn server_settings(&self) -> ServerSettings {
        let net = &self.network;
        ServerSettings {
            comment: self.service.comment.clone(),
            accept_poll_interval: Duration::from_millis(net.accept_poll_ms.max(1)),
            max_connections: net.max_connections.max(1),
            max_line_length: net.max_line_length.max(1),
            shutdown_timeout: Duration::from_millis(net.shutdown_timeout_ms),
            dispatch_queue_depth: net.dispatch_queue_depth.max(1),
            ..ServerSettings::default()
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the platform path.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found", and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PenRemote"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("penremote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PenRemote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("penremote-test-{tag}-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_default_config_matches_published_defaults() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.service.name, "Drawing Pen Remote");
        assert_eq!(cfg.service.identifier, DEFAULT_SERVICE_IDENTIFIER);
        assert_eq!(cfg.service.comment, "Remote control for Drawing Pen");
        assert!(cfg.service.autostart);
        assert_eq!(cfg.network.bind_address, "0.0.0.0:0");
        assert_eq!(cfg.network.max_connections, 8);
        assert_eq!(cfg.network.accept_poll_ms, 1000);
        assert_eq!(cfg.server.control_format, ControlFormat::Text);
    }

    #[test]
    fn test_empty_file_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = r#"
            [network]
            max_connections = 2

            [server]
            control_format = "json"
        "#;

        // Act
        let cfg: AppConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.network.max_connections, 2);
        assert_eq!(cfg.network.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert_eq!(cfg.server.control_format, ControlFormat::Json);
        assert_eq!(cfg.service, ServiceConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        // Arrange
        let path = temp_path("bad");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[network\nmax_connections = ").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config_from(&temp_path("missing")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_changes() {
        // Arrange
        let path = temp_path("save");
        let mut cfg = AppConfig::default();
        cfg.service.name = "Studio Pen".to_string();
        cfg.network.discovery_enabled = false;

        // Act
        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_bind_socket_addr_rejects_garbage() {
        let mut cfg = AppConfig::default();
        cfg.network.bind_address = "everywhere".to_string();

        let result = cfg.bind_socket_addr();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "network.bind_address", .. })
        ));
    }

    #[test]
    fn test_server_settings_clamp_zero_limits() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.network.max_connections = 0;
        cfg.network.accept_poll_ms = 250;

        // Act
        let settings = cfg.server_settings();

        // Assert
        assert_eq!(settings.max_connections, 1);
        assert_eq!(settings.accept_poll_interval, Duration::from_millis(250));
        assert_eq!(settings.comment, "Remote control for Drawing Pen");
    }
}
