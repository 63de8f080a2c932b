//! Configuration management for topdf
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use topdf::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Watching: {}", config.watch.input_dir.display());
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `TOPDF__<section>__<key>`:
//! - `TOPDF__DISPATCH__MAX_CONCURRENCY=8`
//! - `TOPDF__WATCH__INPUT_DIR=/srv/inbox`
//! - `TOPDF__IDENTITY__TENANT_ID=contoso.onmicrosoft.com`
//!
//! Credentials are only read from `TOPDF_CLIENT_SECRET` and
//! `TOPDF_ACCESS_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/topdf.toml`.
//! This can be overridden using the `TOPDF_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

pub use models::{Config, DispatchConfig, IdentityConfig, RemoteConfig, WatchConfig};
pub use validation::{MAX_ATTEMPTS_LIMIT, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment + secrets)
    ///
    /// `path` takes precedence over `TOPDF_CONFIG` and the default location.
    pub fn load(path: Option<std::path::PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path without reading secrets
    ///
    /// The result is not validated: credentials only come from the
    /// environment, so callers fill them in and then call [`Config::validate`].
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        Ok(sources::load_from_sources(path)?)
    }

    /// Validate a configuration assembled in code
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_path_then_validate() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[identity]
client_id = "app"
tenant_id = "tenant"

[remote]
drive = "drives/b!abc"

[dispatch]
max_concurrency = 2
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let mut config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.dispatch.max_concurrency, 2);
        assert_eq!(config.remote.drive, "drives/b!abc");
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingCredential)
        ));

        config.identity.client_secret = Some("secret".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_catches_missing_tenant() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[identity]\nclient_id = \"app\"\n").unwrap();

        let mut config = Config::load_from_path(config_path).unwrap();
        config.identity.access_token = Some("token".to_string());
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingIdentity { field: "tenant_id" })
        ));
    }

    #[test]
    fn test_malformed_file_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[dispatch]\nmax_concurrency = \"many\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_validate_in_code() {
        let mut config = Config::default();
        config.identity.client_id = "app".to_string();
        config.identity.tenant_id = "tenant".to_string();
        config.identity.access_token = Some("token".to_string());

        assert!(config.validate().is_ok());
    }
}
