use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "TOPDF_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/topdf.toml";
const ENV_PREFIX: &str = "TOPDF";
const ENV_SEPARATOR: &str = "__";

const CLIENT_SECRET_VAR: &str = "TOPDF_CLIENT_SECRET";
const ACCESS_TOKEN_VAR: &str = "TOPDF_ACCESS_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (explicit path, `TOPDF_CONFIG`, or the default path)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = explicit_path.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(secret) = env::var(CLIENT_SECRET_VAR) {
        if !secret.is_empty() {
            config.identity.client_secret = Some(secret);
        }
    }
    if let Ok(token) = env::var(ACCESS_TOKEN_VAR) {
        if !token.is_empty() {
            config.identity.access_token = Some(token);
        }
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // TOPDF__DISPATCH__MAX_CONCURRENCY -> dispatch.max_concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
