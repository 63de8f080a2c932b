//! Remote conversion service abstraction
//!
//! The dispatcher only sees [`RemoteConverter`]: upload a document, ask for a
//! rendition in another format, delete the uploaded copy. [`GraphClient`] is
//! the Microsoft Graph (OneDrive) implementation.

pub mod auth;
pub mod graph;

pub use auth::Credential;
pub use graph::GraphClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Payload of {size} bytes exceeds upload limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else {
            RemoteError::RequestFailed(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Format a remote document can be rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Pdf,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud store that can convert uploaded documents
///
/// Implementations are shared by every worker and must tolerate concurrent
/// calls.
#[async_trait]
pub trait RemoteConverter: Send + Sync {
    /// Upload `content` under `name`, returning the remote identifier
    async fn upload(&self, name: &str, content: Bytes) -> Result<String>;

    /// Fetch a rendition of an uploaded document
    async fn render(&self, remote_id: &str, format: RenderFormat) -> Result<Bytes>;

    /// Remove an uploaded document
    async fn delete(&self, remote_id: &str) -> Result<()>;
}
