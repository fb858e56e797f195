use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AvatarError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    #[serde(alias = "persona", alias = "assistant")]
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    #[serde(alias = "role")]
    pub speaker: Speaker,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TranscriptRecord {
    pub id: Uuid,
    pub session_id: String,
    #[sqlx(json)]
    pub messages: Vec<TranscriptMessage>,
    pub message_count: i32,
    pub parsed: bool,
    pub parsed_at: Option<DateTime<Utc>>,
    pub page_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn new(session_id: &str, messages: Vec<TranscriptMessage>, page_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            message_count: messages.len() as i32,
            messages,
            parsed: false,
            parsed_at: None,
            page_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Decode the `messages` field as the widget posts it.
///
/// Accepts a JSON array or a string holding a JSON-encoded array. Anything
/// else is a decoding error; malformed input is never stored as empty.
pub fn decode_messages(value: &serde_json::Value) -> Result<Vec<TranscriptMessage>> {
    match value {
        serde_json::Value::String(encoded) => Ok(serde_json::from_str(encoded)?),
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value.clone())?),
        other => Err(AvatarError::Decode(format!(
            "messages must be a JSON array, got {}",
            json_kind(other)
        ))),
    }
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Session ids are opaque, but must be present.
pub fn validate_session_id(session_id: &str) -> Result<&str> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(AvatarError::Validation("session_id is required".to_string()));
    }
    Ok(trimmed)
}
