//! TOML-based configuration for the emulator.
//!
//! Read from `--config <path>` or, when that flag is absent, from the
//! platform-appropriate config file:
//! - Windows:  `%APPDATA%\ecp-emulator\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/ecp-emulator/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/ecp-emulator/config.toml`
//!
//! A missing file is not an error: every field has a default, so a first run
//! without any file serves one listener on port 8060.
//!
//! ```toml
//! [emulator]
//! host_ip = "0.0.0.0"
//! listen_ports = [8060, "8061:9061"]
//! advertise_ip = "192.168.1.20"
//! upnp_bind_multicast = true
//! friendly_name = "Emulated Roku"
//!
//! [dispatch]
//! queue_capacity = 100
//! topic = "roku_command"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so a file only
//! needs to mention the settings it changes.

use std::path::{Path, PathBuf};

use ecp_core::{
    bind_listeners,
    domain::identity::DEFAULT_FRIENDLY_NAME,
    domain::listener::{DEFAULT_BIND_ADDRESS, DEFAULT_LISTEN_PORT},
    ConfigError, ListenConfig, ListenerSpec, PortEntry,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::dispatch::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TOPIC};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
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

    /// The listener settings are invalid.
    #[error("invalid listener configuration: {0}")]
    Listener(#[from] ConfigError),

    /// `dispatch.queue_capacity` must hold at least one event.
    #[error("dispatch.queue_capacity must be at least 1")]
    ZeroQueueCapacity,

    /// `dispatch.topic` must not be blank.
    #[error("dispatch.topic must not be empty")]
    EmptyTopic,
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Listener and device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmulatorConfig {
    /// IP address to bind every listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_host_ip")]
    pub host_ip: String,
    /// Ports to listen on: integers or `"N"` / `"N:M"` strings.
    #[serde(default = "default_listen_ports")]
    pub listen_ports: Vec<PortEntry>,
    /// Address placed in discovery replies.  Defaults to `host_ip`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_ip: Option<String>,
    /// Whether discovery sockets join the SSDP multicast group.
    #[serde(default = "default_true")]
    pub upnp_bind_multicast: bool,
    /// Name shown by remote apps.
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,
}

/// Event delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Events buffered per subscriber before the oldest is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Topic under which events are published.
    #[serde(default = "default_topic")]
    pub topic: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host_ip() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}
fn default_listen_ports() -> Vec<PortEntry> {
    vec![PortEntry::from(DEFAULT_LISTEN_PORT)]
}
fn default_true() -> bool {
    true
}
fn default_friendly_name() -> String {
    DEFAULT_FRIENDLY_NAME.to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host_ip: default_host_ip(),
            listen_ports: default_listen_ports(),
            advertise_ip: None,
            upnp_bind_multicast: default_true(),
            friendly_name: default_friendly_name(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            topic: default_topic(),
        }
    }
}

impl AppConfig {
    /// The listener section in the form the address binder expects.
    pub fn listen_config(&self) -> ListenConfig {
        ListenConfig {
            bind_address: self.emulator.host_ip.clone(),
            listen_ports: self.emulator.listen_ports.clone(),
            advertise_address: self.emulator.advertise_ip.clone(),
            bind_multicast: self.emulator.upnp_bind_multicast,
        }
    }

    /// Validates the whole file and resolves the listener specs.
    ///
    /// Runs before any socket is opened.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Listener`] for bad addresses or ports, and
    /// the dispatch-specific variants for bad `[dispatch]` values.
    pub fn validate(&self) -> Result<Vec<ListenerSpec>, ConfigFileError> {
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigFileError::ZeroQueueCapacity);
        }
        if self.dispatch.topic.trim().is_empty() {
            return Err(ConfigFileError::EmptyTopic);
        }
        Ok(bind_listeners(&self.listen_config())?)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigFileError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigFileError> {
    platform_config_dir().ok_or(ConfigFileError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigFileError::NoPlatformConfigDir`] if the base directory
/// cannot be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigFileError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the default config file, returning defaults if it does not exist or
/// the platform has no config directory.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system errors other than "not
/// found", and [`ConfigFileError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigFileError> {
    match config_file_path() {
        Ok(path) => read_config(&path, true),
        Err(ConfigFileError::NoPlatformConfigDir) => Ok(AppConfig::default()),
        Err(e) => Err(e),
    }
}

/// Loads an explicitly named config file.  The file must exist.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigFileError> {
    read_config(path, false)
}

fn read_config(path: &Path, missing_ok: bool) -> Result<AppConfig, ConfigFileError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config base directory plus the `ecp-emulator`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ecp-emulator"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("ecp-emulator"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ecp-emulator")
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
    use uuid::Uuid;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_serves_port_8060_on_all_interfaces() {
        // Arrange / Act
        let cfg = AppConfig::default();
        let specs = cfg.validate().expect("defaults must be valid");

        // Assert
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].control_port, 8060);
        assert_eq!(specs[0].advertise_port, 8060);
        assert_eq!(specs[0].bind_address.to_string(), "0.0.0.0");
        assert!(cfg.emulator.upnp_bind_multicast);
    }

    #[test]
    fn test_dispatch_config_defaults() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.topic, "roku_command");
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("empty file");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_mixed_integer_and_string_ports() {
        // Arrange
        let toml_str = r#"
[emulator]
host_ip = "0.0.0.0"
listen_ports = [8060, "8061:9061", "8062"]
advertise_ip = "192.168.1.20"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize");
        let specs = cfg.validate().expect("valid");

        // Assert
        assert_eq!(
            specs
                .iter()
                .map(|s| (s.control_port, s.advertise_port))
                .collect::<Vec<_>>(),
            vec![(8060, 8060), (8061, 9061), (8062, 8062)]
        );
        assert!(specs
            .iter()
            .all(|s| s.advertise_address.to_string() == "192.168.1.20"));
        // Unspecified fields keep their defaults
        assert_eq!(cfg.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_port_of_wrong_type_is_rejected_at_parse_time() {
        let result: Result<AppConfig, _> = toml::from_str("[emulator]\nlisten_ports = [true]\n");
        assert!(result.is_err());
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_bad_port_before_any_socket() {
        let mut cfg = AppConfig::default();
        cfg.emulator.listen_ports = vec![PortEntry::from("70000")];

        let err = cfg.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigFileError::Listener(ConfigError::PortOutOfRange(70000))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_host_ip() {
        let mut cfg = AppConfig::default();
        cfg.emulator.host_ip = "living-room".to_string();

        assert!(matches!(
            cfg.validate(),
            Err(ConfigFileError::Listener(ConfigError::InvalidAddress { .. }))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_queue_capacity_and_blank_topic() {
        let mut cfg = AppConfig::default();
        cfg.dispatch.queue_capacity = 0;
        assert!(matches!(cfg.validate(), Err(ConfigFileError::ZeroQueueCapacity)));

        let mut cfg = AppConfig::default();
        cfg.dispatch.topic = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigFileError::EmptyTopic)));
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_to_toml_round_trips_and_omits_missing_advertise_ip() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.emulator.listen_ports = vec![PortEntry::from(8060u16), PortEntry::from("8061:9061")];

        // Act
        let toml_str = cfg.to_toml().expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert!(!toml_str.contains("advertise_ip"));
        assert_eq!(cfg, restored);
    }

    // ── Loading from disk ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_reads_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("ecp_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[emulator]\nfriendly_name = \"Den\"\n").unwrap();

        // Act
        let cfg = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(cfg.emulator.friendly_name, "Den");
        assert_eq!(cfg.emulator.listen_ports, default_listen_ports());

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_missing_file_is_io_error() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let err = load_config_from(&path).unwrap_err();

        assert!(matches!(err, ConfigFileError::Io { path: p, .. } if p == path));
    }

    #[test]
    fn test_read_config_treats_missing_default_file_as_defaults() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");
        assert_eq!(read_config(&path, true).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("ecp-emulator/config.toml"),
                "unexpected config path {path:?}"
            );
        }
        // NoPlatformConfigDir (e.g. a stripped CI env) is also acceptable.
    }
}
