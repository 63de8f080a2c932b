use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Identity used to obtain Graph access tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// Client secret (loaded from environment, not from config file)
    #[serde(skip)]
    pub client_secret: Option<String>,
    /// Pre-acquired bearer token (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            tenant_id: String::new(),
            scopes: default_scopes(),
            authority_url: default_authority_url(),
            client_secret: None,
            access_token: None,
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec!["https://graph.microsoft.com/.default".to_string()]
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

/// Remote conversion service (Microsoft Graph drive)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Drive path relative to `base_url`, e.g. `me/drive` or `drives/{id}`
    #[serde(default = "default_drive")]
    pub drive: String,
    /// Folder under the drive root that receives temporary uploads
    #[serde(default)]
    pub staging_folder: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            drive: default_drive(),
            staging_folder: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_drive() -> String {
    "me/drive".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_upload_mb() -> u64 {
    250 // Graph simple upload limit
}

/// Directory watch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Extensions (without dot) that trigger a conversion, matched case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Wait for the input size to stop changing before reading (0 disables)
    #[serde(default)]
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            extensions: default_extensions(),
            settle_ms: 0,
        }
    }
}

impl WatchConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_extensions() -> Vec<String> {
    vec!["docx".to_string(), "xlsx".to_string(), "pptx".to_string()]
}

/// Dispatcher concurrency and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

fn default_max_concurrency() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}
