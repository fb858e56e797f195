//! Transcript intake: decode, validate and store what the widget posts.

use avatar_core::error::{AvatarError, Result};
use avatar_core::models::{decode_messages, validate_session_id, TranscriptRecord};
use avatar_core::TranscriptStore;
use serde_json::Value;

/// Save (or overwrite) the transcript of one session.
///
/// `messages` is the raw wire value; it must decode to a message array.
pub async fn save_transcript(
    store: &dyn TranscriptStore,
    session_id: &str,
    messages: &Value,
    page_url: Option<String>,
) -> Result<TranscriptRecord> {
    let session_id = validate_session_id(session_id)?;
    let messages = decode_messages(messages)?;
    let page_url = page_url.filter(|u| !u.trim().is_empty());

    let record = store.save_transcript(session_id, messages, page_url).await?;

    tracing::info!(
        session_id,
        message_count = record.message_count,
        store = store.name(),
        "Transcript saved"
    );
    Ok(record)
}

pub async fn get_transcript(store: &dyn TranscriptStore, session_id: &str) -> Result<TranscriptRecord> {
    let session_id = validate_session_id(session_id)?;
    store
        .get_transcript(session_id)
        .await?
        .ok_or_else(|| AvatarError::NotFound(format!("session {}", session_id)))
}

/// Transcripts still waiting for extraction, oldest first.
pub async fn list_unparsed(store: &dyn TranscriptStore) -> Result<Vec<TranscriptRecord>> {
    store.list_unparsed().await
}
