//! Anam session-token relay. The browser widget never sees the API key.

use avatar_core::error::{AvatarError, Result};
use avatar_core::{AnamClient, SessionTokenError};

pub async fn session_token(client: Option<&AnamClient>) -> Result<String> {
    let client = client.ok_or(AvatarError::SessionToken(SessionTokenError::MissingApiKey))?;
    match client.session_token().await {
        Ok(token) => {
            tracing::info!("Issued Anam session token");
            Ok(token)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Anam session token request failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::config::{AnamConfig, HttpClientConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_missing_client_is_not_configured() {
        let err = session_token(None).await.unwrap_err();
        assert_eq!(err.code(), "not_configured");
    }

    #[tokio::test]
    async fn test_relays_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionToken": "tok-1"})))
            .mount(&server)
            .await;

        let config = AnamConfig {
            api_key: "anam-key".into(),
            base_url: server.uri(),
            ..Default::default()
        };
        let client = AnamClient::new(&config, &HttpClientConfig { timeout_seconds: 5 }).unwrap();
        assert_eq!(session_token(Some(&client)).await.unwrap(), "tok-1");
    }
}
