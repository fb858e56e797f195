//! Supabase forwarding client
//!
//! One POST per forward to `{url}/rest/v1/{table}`. No retry, no backoff:
//! every failure goes straight back to the caller with the raw status/body.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{HttpClientConfig, SupabaseConfig};
use crate::models::ReviewRecord;

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Supabase URL or API key not configured")]
    NotConfigured,
}

/// Row inserted into the lead table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ForwardPayload {
    pub session_id: String,
    pub year: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
    pub page_url: Option<String>,
    pub conversation_date: Option<DateTime<Utc>>,
    pub processed_at: DateTime<Utc>,
}

impl ForwardPayload {
    pub fn from_review(review: &ReviewRecord, processed_at: DateTime<Utc>) -> Self {
        Self {
            session_id: review.session_id.clone(),
            year: review.vehicle.year.clone(),
            make: review.vehicle.make.clone(),
            model: review.vehicle.model.clone(),
            vin: review.vehicle.vin.clone(),
            page_url: review.page_url.clone(),
            conversation_date: review.conversation_date,
            processed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig, http: &HttpClientConfig) -> Result<Self, ForwardError> {
        if config.url.is_empty() || config.api_key.is_empty() {
            return Err(ForwardError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/rest/v1/{}",
                config.url.trim_end_matches('/'),
                config.table
            ),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Insert one row and return the id Supabase assigned to it.
    pub async fn insert(&self, payload: &ForwardPayload) -> Result<String, ForwardError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(code = status.as_u16(), body = %body, "Supabase API error");
            return Err(ForwardError::Api {
                code: status.as_u16(),
                message: body,
            });
        }

        let rows: Vec<InsertedRow> = serde_json::from_str(&body)
            .map_err(|e| ForwardError::MalformedResponse(format!("{}: {}", e, body)))?;

        let id = rows
            .into_iter()
            .next()
            .ok_or_else(|| ForwardError::MalformedResponse("empty row array".to_string()))?
            .id;

        match id {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(ForwardError::MalformedResponse(format!(
                "unexpected id value: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
