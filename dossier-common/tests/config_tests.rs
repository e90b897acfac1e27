//! Integration tests for config file resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate DOSSIER_CONFIG are marked with #[serial].

use dossier_common::config::{
    load_toml_config, write_toml_config, ConfigFileResolver, ConfigSource, LoggingConfig,
    CONFIG_ENV_VAR,
};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct AppConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/dossier-env-config.toml");

    let resolver = ConfigFileResolver::new("dossier-test");
    let (path, source) = resolver.resolve().unwrap();

    assert_eq!(path, PathBuf::from("/tmp/dossier-env-config.toml"));
    assert_eq!(source, ConfigSource::Environment);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/dossier-env-config.toml");

    let resolver = ConfigFileResolver::new("dossier-test")
        .with_cli_arg(Some(PathBuf::from("/tmp/dossier-cli.toml")));
    let (path, source) = resolver.resolve().unwrap();

    assert_eq!(path, PathBuf::from("/tmp/dossier-cli.toml"));
    assert_eq!(source, ConfigSource::CommandLine);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let resolver = ConfigFileResolver::new("dossier-test-nonexistent-app");
    let resolved = resolver.resolve();
    assert!(
        resolved.map(|(_, s)| s != ConfigSource::Environment).unwrap_or(true),
        "Blank env var must not resolve"
    );

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_write_then_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = AppConfig {
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
        deadline_ms: Some(2500),
    };

    write_toml_config(&config, &path).unwrap();
    assert!(path.exists());

    let loaded: AppConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "deadline_ms = \"not a number\"").unwrap();

    let result: dossier_common::Result<AppConfig> = load_toml_config(Some(&path));
    assert!(matches!(result, Err(dossier_common::Error::Config(_))));
}

#[test]
fn test_partial_toml_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "deadline_ms = 100\n").unwrap();

    let loaded: AppConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(loaded.deadline_ms, Some(100));
    assert_eq!(loaded.logging, LoggingConfig::default());
}
