//! Unit tests for configuration and graceful degradation
//!
//! Tests cover:
//! - Root folder priority order (CLI > env > config file > default)
//! - Missing or malformed TOML falls back to defaults
//! - Partial TOML files keep compiled defaults for absent keys
//! - Database and static directory path resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate WATCHDOG_ROOT_FOLDER are marked with #[serial].

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use watchdog_common::config::{
    default_root_folder, resolve_root_folder, TomlConfig, CONFIG_FILE_NAME, ROOT_FOLDER_ENV,
};

#[test]
fn test_compiled_defaults() {
    let config = TomlConfig::default();

    assert_eq!(config.port, 3000);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert_eq!(config.relay.ffmpeg_path, "ffmpeg");
    assert_eq!(config.relay.viewer_queue_capacity, 64);
    assert_eq!(config.alerts.alarm_interval_ms, 3000);
    assert_eq!(config.alerts.recent_alert_limit, 5);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_root_folder_is_not_empty() {
    let root = default_root_folder();
    assert!(!root.as_os_str().is_empty());
    assert!(root.to_string_lossy().contains("watchdog"));
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/watchdog-from-env");

    let root = resolve_root_folder(Some(Path::new("/tmp/watchdog-from-cli")));
    assert_eq!(root, PathBuf::from("/tmp/watchdog-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_overrides_default() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/watchdog-test-env-folder");

    let root = resolve_root_folder(None);
    assert_eq!(root, PathBuf::from("/tmp/watchdog-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let root = resolve_root_folder(None);
    assert_ne!(root, PathBuf::from("   "));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let config = TomlConfig::load_or_default(Some(Path::new("/nonexistent/watchdog.toml")));
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_no_config_file_uses_defaults() {
    assert_eq!(TomlConfig::load_or_default(None), TomlConfig::default());
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        r#"
port = 8088

[relay]
ffmpeg_path = "/usr/local/bin/ffmpeg"
"#,
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.port, 8088);
    assert_eq!(config.relay.ffmpeg_path, "/usr/local/bin/ffmpeg");
    assert_eq!(config.relay.viewer_queue_capacity, 64);
    assert_eq!(config.alerts.alarm_interval_ms, 3000);
}

#[test]
fn test_malformed_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    assert!(TomlConfig::load(&path).is_err());
    assert_eq!(TomlConfig::load_or_default(Some(&path)), TomlConfig::default());
}

#[test]
fn test_invalid_values_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[relay]\nviewer_queue_capacity = 0\n").unwrap();

    let err = TomlConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("viewer_queue_capacity"));
}

#[test]
fn test_locate_prefers_explicit_then_root() {
    let dir = tempfile::tempdir().unwrap();
    let explicit = PathBuf::from("/tmp/explicit-watchdog.toml");
    assert_eq!(
        TomlConfig::locate(dir.path(), Some(&explicit)),
        Some(explicit.clone())
    );

    let in_root = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&in_root, "port = 4000\n").unwrap();
    assert_eq!(TomlConfig::locate(dir.path(), None), Some(in_root));
}

#[test]
fn test_database_path_resolution() {
    let root = PathBuf::from("/srv/watchdog");

    let config = TomlConfig::default();
    assert_eq!(config.database_path(&root), root.join("watchdog.db"));

    let relative = TomlConfig {
        database_path: Some(PathBuf::from("data/catalog.db")),
        ..TomlConfig::default()
    };
    assert_eq!(relative.database_path(&root), root.join("data/catalog.db"));

    let absolute = TomlConfig {
        database_path: Some(PathBuf::from("/var/lib/catalog.db")),
        ..TomlConfig::default()
    };
    assert_eq!(absolute.database_path(&root), PathBuf::from("/var/lib/catalog.db"));
}

#[test]
fn test_static_dir_resolution() {
    let root = PathBuf::from("/srv/watchdog");
    assert_eq!(TomlConfig::default().static_dir(&root), None);

    let config = TomlConfig {
        static_dir: Some(PathBuf::from("dist")),
        ..TomlConfig::default()
    };
    assert_eq!(config.static_dir(&root), Some(root.join("dist")));
}
