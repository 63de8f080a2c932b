use super::models::Config;
use thiserror::Error;

/// Upper bound on attempts; keeps `base * 2^attempt` well inside `Duration`
pub const MAX_ATTEMPTS_LIMIT: u32 = 16;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("identity.{field} must not be empty")]
    MissingIdentity { field: &'static str },

    #[error("No credential available: set TOPDF_ACCESS_TOKEN or TOPDF_CLIENT_SECRET")]
    MissingCredential,

    #[error(
        "remote.drive = \"{drive}\" needs a signed-in user; with TOPDF_CLIENT_SECRET set it to drives/<id>, users/<id>/drive or sites/<id>/drive"
    )]
    DelegatedDriveWithAppCredential { drive: String },

    #[error("dispatch.max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("dispatch.max_attempts must be between 1 and {limit}, got {value}")]
    InvalidMaxAttempts { value: u32, limit: u32 },

    #[error("watch.extensions must list at least one extension")]
    NoExtensions,

    #[error("watch.input_dir and watch.output_dir must differ ({path})")]
    SameInputOutputDir { path: String },

    #[error("remote.max_upload_mb must be at least 1")]
    InvalidUploadLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_identity(config)?;
    validate_dispatch(config)?;
    validate_watch(config)?;

    if config.remote.max_upload_mb == 0 {
        return Err(ValidationError::InvalidUploadLimit);
    }

    Ok(())
}

fn validate_identity(config: &Config) -> Result<(), ValidationError> {
    let identity = &config.identity;

    if identity.client_id.trim().is_empty() {
        return Err(ValidationError::MissingIdentity { field: "client_id" });
    }
    if identity.tenant_id.trim().is_empty() {
        return Err(ValidationError::MissingIdentity { field: "tenant_id" });
    }
    if identity.access_token.is_none() && identity.client_secret.is_none() {
        return Err(ValidationError::MissingCredential);
    }

    // App-only tokens from the client-credentials grant have no `/me`
    let app_only = identity.access_token.is_none();
    if app_only && is_delegated_drive(&config.remote.drive) {
        return Err(ValidationError::DelegatedDriveWithAppCredential {
            drive: config.remote.drive.clone(),
        });
    }

    Ok(())
}

fn is_delegated_drive(drive: &str) -> bool {
    let drive = drive.trim_start_matches('/');
    drive == "me" || drive.starts_with("me/")
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    let dispatch = &config.dispatch;

    if dispatch.max_concurrency == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }
    if dispatch.max_attempts == 0 || dispatch.max_attempts > MAX_ATTEMPTS_LIMIT {
        return Err(ValidationError::InvalidMaxAttempts {
            value: dispatch.max_attempts,
            limit: MAX_ATTEMPTS_LIMIT,
        });
    }

    Ok(())
}

fn validate_watch(config: &Config) -> Result<(), ValidationError> {
    let watch = &config.watch;

    if watch.extensions.iter().all(|ext| ext.trim().is_empty()) {
        return Err(ValidationError::NoExtensions);
    }
    if watch.input_dir == watch.output_dir {
        return Err(ValidationError::SameInputOutputDir {
            path: watch.input_dir.display().to_string(),
        });
    }

    Ok(())
}
