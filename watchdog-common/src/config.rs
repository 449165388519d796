//! Bootstrap configuration loading and root folder resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (handled by the binary)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing or malformed TOML file never stops startup: the service logs a
//! warning and continues with compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "WATCHDOG_ROOT_FOLDER";

/// Name of the per-root configuration file
pub const CONFIG_FILE_NAME: &str = "watchdog.toml";

/// Name of the catalog database inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "watchdog.db";

/// Largest transcoder read accepted for a single relay chunk
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Bootstrap configuration loaded from TOML
///
/// Every field has a compiled default, so a partial file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding the database and static assets
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    ///
    /// Default: 3000
    pub port: u16,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Catalog database path (absolute, or relative to the root folder)
    pub database_path: Option<PathBuf>,

    /// Directory with the dashboard's static build output
    pub static_dir: Option<PathBuf>,

    pub relay: RelayConfig,

    pub alerts: AlertConfig,

    pub logging: LoggingConfig,
}

/// Stream relay configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    pub ffmpeg_path: String,

    /// Pending messages buffered per viewer before chunks are dropped
    pub viewer_queue_capacity: usize,

    /// Maximum bytes read from the transcoder per pushed chunk
    pub chunk_size: usize,
}

/// Alert engine configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two audible alarms in one session
    pub alarm_interval_ms: u64,

    /// Number of alert lines kept per session
    pub recent_alert_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is not set (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            database_path: None,
            static_dir: None,
            relay: RelayConfig::default(),
            alerts: AlertConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            viewer_queue_capacity: 64,
            chunk_size: 64 * 1024,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alarm_interval_ms: 3000,
            recent_alert_limit: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any problem
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No configuration file found, using compiled defaults");
            return Self::default();
        };

        if !path.exists() {
            warn!(
                "Configuration file {} not found, using compiled defaults",
                path.display()
            );
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring configuration file: {}. Using compiled defaults", e);
                Self::default()
            }
        }
    }

    /// Find the configuration file to use
    ///
    /// An explicit path always wins, even when it does not exist, so the
    /// caller can report it. Otherwise `<root>/watchdog.toml` and then the
    /// per-user / system configuration file are tried.
    pub fn locate(root_folder: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let in_root = root_folder.join(CONFIG_FILE_NAME);
        if in_root.exists() {
            return Some(in_root);
        }

        user_config_file()
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.relay.viewer_queue_capacity == 0 {
            return Err(Error::Config(
                "relay.viewer_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.relay.chunk_size == 0 || self.relay.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "relay.chunk_size must be between 1 and {} bytes",
                MAX_CHUNK_SIZE
            )));
        }
        if self.relay.ffmpeg_path.trim().is_empty() {
            return Err(Error::Config("relay.ffmpeg_path must not be empty".to_string()));
        }
        if self.alerts.recent_alert_limit == 0 {
            return Err(Error::Config(
                "alerts.recent_alert_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the catalog database path against the root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join(DEFAULT_DATABASE_FILE),
        }
    }

    /// Resolve the static asset directory against the root folder
    pub fn static_dir(&self, root_folder: &Path) -> Option<PathBuf> {
        self.static_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                root_folder.join(dir)
            }
        })
    }
}

/// Root folder resolution
///
/// 1. Command-line argument (highest priority)
/// 2. `WATCHDOG_ROOT_FOLDER` environment variable
/// 3. `root_folder` key of the user/system TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = user_config_file() {
        if let Ok(config) = TomlConfig::load(&config_path) {
            if let Some(root) = config.root_folder {
                return root;
            }
        }
    }

    default_root_folder()
}

/// Per-user configuration file, then the system-wide one
fn user_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("watchdog").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/watchdog/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/watchdog (or /var/lib/watchdog for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("watchdog"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/watchdog"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("watchdog"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/watchdog"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("watchdog"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\watchdog"))
    } else {
        PathBuf::from("./watchdog_data")
    }
}
