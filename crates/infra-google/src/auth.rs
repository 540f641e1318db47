//! Google OAuth2 as two explicit steps: `exchange` turns an authorization code
//! into a [`TokenPair`], `refresh` turns a refresh token into a new access
//! token. Nothing is remembered between calls.

use penny_domain::TokenPair;
use penny_error::AgentError;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URI: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub const SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events.owned",
];

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct OAuthClient {
    config: OAuthConfig,
    client: Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Consent URL. `prompt=consent` makes Google hand out a refresh token
    /// even for users who granted access before.
    pub fn authorize_url(&self, state: &str) -> Result<String, AgentError> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            AUTH_URI,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| AgentError::internal(format!("auth url: {e}")))?;
        Ok(url.into())
    }

    pub async fn exchange(&self, code: &str) -> Result<TokenPair, AgentError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AgentError::invalid_input("authorization code cannot be empty"));
        }

        let resp = self
            .token_request(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        info!("exchanged authorization code");
        token_pair(resp)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AgentError> {
        let resp = self
            .token_request(&[
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        debug!("refreshed access token");
        Ok(resp.access_token)
    }

    pub async fn user_email(&self, access_token: &str) -> Result<String, AgentError> {
        let resp = self
            .client
            .get(USERINFO_URI)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AgentError::network(format!("userinfo request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AgentError::auth(format!("userinfo: HTTP {}", resp.status())));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AgentError::api(format!("userinfo: invalid response: {e}")))?;
        body["email"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AgentError::auth("userinfo response has no email"))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AgentError> {
        let resp = self
            .client
            .post(TOKEN_URI)
            .form(form)
            .send()
            .await
            .map_err(|e| AgentError::network(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::auth(format!(
                "token endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        resp.json()
            .await
            .map_err(|e| AgentError::auth(format!("invalid token response: {e}")))
    }
}

fn token_pair(resp: TokenResponse) -> Result<TokenPair, AgentError> {
    let refresh_token = resp.refresh_token.filter(|t| !t.is_empty()).ok_or_else(|| {
        AgentError::auth("no refresh token returned; revoke access and sign in again")
    })?;
    Ok(TokenPair {
        access_token: resp.access_token,
        refresh_token,
    })
}
