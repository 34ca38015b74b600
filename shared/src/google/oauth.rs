//! Google OAuth: client secrets, stored user token and access-token refresh.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client registration.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Contents of the downloaded `credentials.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub installed: Option<OAuthClient>,
    pub web: Option<OAuthClient>,
}

impl ClientSecrets {
    pub fn client(&self) -> Result<&OAuthClient> {
        self.installed
            .as_ref()
            .or(self.web.as_ref())
            .ok_or_else(|| Error::Config("Google credentials have no 'installed' or 'web' client".to_string()))
    }
}

/// Authorized-user token (`token.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizedUserToken {
    /// Last access token
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Obtain a usable access token, refreshing it when a refresh token is stored.
pub async fn access_token(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    token: &AuthorizedUserToken,
) -> Result<String> {
    let Some(refresh_token) = token.refresh_token.as_deref() else {
        debug!("No refresh token stored, using saved access token");
        return token
            .token
            .clone()
            .ok_or_else(|| Error::Config("Google token has neither refresh_token nor token".to_string()));
    };

    let client = secrets.client()?;
    let token_uri = token.token_uri.as_deref().unwrap_or(&client.token_uri);
    let client_id = token.client_id.as_deref().unwrap_or(&client.client_id);
    let client_secret = token
        .client_secret
        .as_deref()
        .unwrap_or(&client.client_secret);

    refresh_access_token(http, token_uri, client_id, client_secret, refresh_token).await
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<String> {
    let params = [
        ("refresh_token", refresh_token),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", "refresh_token"),
    ];

    let response = http.post(token_uri).form(&params).send().await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(Error::Google {
            status: status.as_u16(),
            message: format!("Token refresh failed: {}", error_text),
        });
    }

    let token_response: TokenResponse = response.json().await?;
    info!("Refreshed Google access token");
    Ok(token_response.access_token)
}
