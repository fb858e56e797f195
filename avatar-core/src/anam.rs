//! Anam session-token relay
//!
//! The browser widget never sees the API key: it asks this service for a
//! short-lived session token, which we mint via
//! `POST {base_url}/v1/auth/session-token`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{AnamConfig, HttpClientConfig, PersonaConfig};

#[derive(Error, Debug)]
pub enum SessionTokenError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing session token in response")]
    MissingToken,

    #[error("Missing Anam API key")]
    MissingApiKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionTokenRequest<'a> {
    persona_config: PersonaPayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonaPayload<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    avatar_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    voice_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    llm_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system_prompt: &'a str,
}

impl<'a> From<&'a PersonaConfig> for PersonaPayload<'a> {
    fn from(p: &'a PersonaConfig) -> Self {
        Self {
            name: &p.name,
            avatar_id: &p.avatar_id,
            voice_id: &p.voice_id,
            llm_id: &p.llm_id,
            system_prompt: &p.system_prompt,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionTokenResponse {
    session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnamClient {
    client: Client,
    api_key: String,
    base_url: String,
    persona: PersonaConfig,
}

impl AnamClient {
    pub fn new(config: &AnamConfig, http: &HttpClientConfig) -> Result<Self, SessionTokenError> {
        if config.api_key.is_empty() {
            return Err(SessionTokenError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            persona: config.persona.clone(),
        })
    }

    /// Mint a session token for the configured persona. Not retried.
    pub async fn session_token(&self) -> Result<String, SessionTokenError> {
        let url = format!("{}/v1/auth/session-token", self.base_url);
        let request = SessionTokenRequest {
            persona_config: PersonaPayload::from(&self.persona),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Anam API error");
            return Err(SessionTokenError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: SessionTokenResponse = response.json().await?;
        body.session_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionTokenError::MissingToken)
    }
}
