//! Bearer token acquisition for Microsoft Graph
//!
//! Interactive login is out of scope: either a token is handed in from
//! outside (`TOPDF_ACCESS_TOKEN`), or the service authenticates as itself
//! with the OAuth2 client-credentials grant.

use super::{RemoteError, Result};
use crate::config::IdentityConfig;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub enum Credential {
    /// Pre-acquired token, used as-is
    AccessToken(String),
    /// Client-credentials grant, token cached until shortly before expiry
    ClientSecret(ClientSecretCredential),
}

impl Credential {
    /// Pick the credential from identity settings (access token wins)
    pub fn from_identity(identity: &IdentityConfig) -> Result<Self> {
        if let Some(token) = &identity.access_token {
            return Ok(Credential::AccessToken(token.clone()));
        }

        let secret = identity.client_secret.clone().ok_or_else(|| {
            RemoteError::Auth("no access token or client secret configured".to_string())
        })?;

        Ok(Credential::ClientSecret(ClientSecretCredential::new(
            &identity.authority_url,
            &identity.tenant_id,
            &identity.client_id,
            secret,
            &identity.scopes,
        )))
    }

    /// Current bearer token, fetching a new one if needed
    pub async fn bearer(&self, http: &Client) -> Result<String> {
        match self {
            Credential::AccessToken(token) => Ok(token.clone()),
            Credential::ClientSecret(credential) => credential.token(http).await,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::AccessToken(_) => f.write_str("Credential::AccessToken(<redacted>)"),
            Credential::ClientSecret(c) => f
                .debug_struct("Credential::ClientSecret")
                .field("token_url", &c.token_url)
                .field("client_id", &c.client_id)
                .finish_non_exhaustive(),
        }
    }
}

pub struct ClientSecretCredential {
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl ClientSecretCredential {
    pub fn new(
        authority_url: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: String,
        scopes: &[String],
    ) -> Self {
        Self {
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority_url.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.to_string(),
            client_secret,
            scope: scopes.join(" "),
            cached: Mutex::new(None),
        }
    }

    async fn token(&self, http: &Client) -> Result<String> {
        // Held across the fetch so concurrent workers share one request
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch(http).await?;
        let value = fresh.access_token.clone();
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: fresh.access_token,
            refresh_at: Instant::now() + lifetime,
        });

        debug!(expires_in = fresh.expires_in, "Acquired Graph access token");

        Ok(value)
    }

    async fn fetch(&self, http: &Client) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = http.post(&self.token_url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RemoteError::Auth(format!("malformed token response: {}", e)))
    }
}
