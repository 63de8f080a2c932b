//! Microsoft Graph drive client

use super::auth::Credential;
use super::{RemoteConverter, RemoteError, RenderFormat, Result};
use crate::config::RemoteConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("topdf/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct DriveItem {
    id: String,
}

/// Graph client uploading into a drive and rendering via `?format=`
pub struct GraphClient {
    client: Client,
    credential: Credential,
    base_url: Url,
    drive: Vec<String>,
    staging_folder: Vec<String>,
    max_upload_bytes: u64,
}

impl GraphClient {
    /// Create a new Graph client
    pub fn new(config: &RemoteConfig, credential: Credential) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            credential,
            base_url,
            drive: split_path(&config.drive),
            staging_folder: split_path(&config.staging_folder),
            max_upload_bytes: config.max_upload_bytes(),
        })
    }

    /// `{base_url}/{drive}/{segments...}` with each segment percent-encoded
    fn drive_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(&self.drive)
            .extend(segments);
        Ok(url)
    }

    /// `root:/{staging_folder}/{name}:/content`
    fn upload_url(&self, name: &str) -> Result<Url> {
        let target = format!("{}:", name);
        let segments = std::iter::once("root:")
            .chain(self.staging_folder.iter().map(String::as_str))
            .chain([target.as_str(), "content"]);
        self.drive_url(segments)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.credential.bearer(&self.client).await?;
        let response = request.bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: if body.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                } else {
                    body
                },
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl RemoteConverter for GraphClient {
    async fn upload(&self, name: &str, content: Bytes) -> Result<String> {
        let size = content.len() as u64;
        if size > self.max_upload_bytes {
            return Err(RemoteError::PayloadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        let url = self.upload_url(name)?;
        debug!(%url, size, "Uploading document");

        let response = self
            .send(self.client.request(Method::PUT, url).body(content))
            .await?;

        let item: DriveItem = response.json().await?;

        info!(name, size, remote_id = %item.id, "Uploaded document");

        Ok(item.id)
    }

    async fn render(&self, remote_id: &str, format: RenderFormat) -> Result<Bytes> {
        let mut url = self.drive_url(["items", remote_id, "content"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());

        debug!(remote_id, %format, "Requesting rendition");

        let response = self.send(self.client.get(url)).await?;
        let bytes = response.bytes().await?;

        debug!(remote_id, %format, size = bytes.len(), "Rendition downloaded");

        Ok(bytes)
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let url = self.drive_url(["items", remote_id])?;
        self.send(self.client.delete(url)).await?;

        debug!(remote_id, "Deleted remote document");

        Ok(())
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
