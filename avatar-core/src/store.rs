//! Record store: transcripts and review records keyed by `session_id`
//!
//! Provides a `TranscriptStore` trait with implementations for:
//! - **Postgres**: sqlx-backed, see `pg_store`
//! - **Memory**: process-local maps for development and tests
//!
//! Writes are last-write-wins per session; there is no merge logic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::{AvatarConfig, StorageBackend};
use crate::error::{AvatarError, Result};
use crate::models::{
    ReviewRecord, ReviewStatus, TranscriptMessage, TranscriptRecord, VehicleFields,
};
use crate::pg_store::PgStore;

/// Rows removed by an administrative reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub transcripts_deleted: u64,
    pub reviews_deleted: u64,
}

/// Abstraction over record stores.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Insert, or overwrite the messages of an existing session.
    /// `page_url` only replaces the stored one when provided.
    async fn save_transcript(
        &self,
        session_id: &str,
        messages: Vec<TranscriptMessage>,
        page_url: Option<String>,
    ) -> Result<TranscriptRecord>;

    async fn get_transcript(&self, session_id: &str) -> Result<Option<TranscriptRecord>>;

    /// Fails with `NotFound` when the session has no transcript.
    async fn mark_parsed(&self, session_id: &str) -> Result<()>;

    async fn list_unparsed(&self) -> Result<Vec<TranscriptRecord>>;

    /// Insert a review, or overwrite the vehicle fields of an existing one.
    async fn upsert_review(&self, review: &ReviewRecord) -> Result<ReviewRecord>;

    async fn get_review(&self, session_id: &str) -> Result<Option<ReviewRecord>>;

    /// Newest first. `None` lists every status.
    async fn list_reviews(&self, status: Option<ReviewStatus>) -> Result<Vec<ReviewRecord>>;

    async fn update_review_fields(
        &self,
        session_id: &str,
        fields: VehicleFields,
    ) -> Result<ReviewRecord>;

    async fn mark_review_sent(&self, session_id: &str, supabase_id: &str) -> Result<ReviewRecord>;

    /// Keep the review pending and remember why the forward failed.
    async fn record_forward_error(&self, session_id: &str, error: &str) -> Result<()>;

    async fn reset(&self) -> Result<ResetReport>;

    /// Backend version string for health checks.
    async fn health(&self) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Create the configured store. Postgres connects and applies the schema.
pub async fn create_store(config: &AvatarConfig) -> Result<Arc<dyn TranscriptStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Postgres => {
            let pool = crate::db::create_pool(&config.database).await?;
            crate::db::ensure_schema(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

fn not_found(session_id: &str) -> AvatarError {
    AvatarError::NotFound(format!("session {}", session_id))
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    transcripts: RwLock<HashMap<String, TranscriptRecord>>,
    reviews: RwLock<HashMap<String, ReviewRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn save_transcript(
        &self,
        session_id: &str,
        messages: Vec<TranscriptMessage>,
        page_url: Option<String>,
    ) -> Result<TranscriptRecord> {
        let mut transcripts = self.transcripts.write().await;
        let record = match transcripts.get_mut(session_id) {
            Some(existing) => {
                existing.message_count = messages.len() as i32;
                existing.messages = messages;
                if page_url.is_some() {
                    existing.page_url = page_url;
                }
                existing.parsed = false;
                existing.parsed_at = None;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let record = TranscriptRecord::new(session_id, messages, page_url);
                transcripts.insert(session_id.to_string(), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn get_transcript(&self, session_id: &str) -> Result<Option<TranscriptRecord>> {
        Ok(self.transcripts.read().await.get(session_id).cloned())
    }

    async fn mark_parsed(&self, session_id: &str) -> Result<()> {
        let mut transcripts = self.transcripts.write().await;
        let record = transcripts
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        let now = Utc::now();
        record.parsed = true;
        record.parsed_at = Some(now);
        record.updated_at = now;
        Ok(())
    }

    async fn list_unparsed(&self) -> Result<Vec<TranscriptRecord>> {
        let mut records: Vec<TranscriptRecord> = self
            .transcripts
            .read()
            .await
            .values()
            .filter(|r| !r.parsed)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn upsert_review(&self, review: &ReviewRecord) -> Result<ReviewRecord> {
        let mut reviews = self.reviews.write().await;
        let record = match reviews.get_mut(&review.session_id) {
            Some(existing) => {
                existing.vehicle = review.vehicle.clone();
                existing.page_url = review.page_url.clone();
                existing.conversation_date = review.conversation_date;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                reviews.insert(review.session_id.clone(), review.clone());
                review.clone()
            }
        };
        Ok(record)
    }

    async fn get_review(&self, session_id: &str) -> Result<Option<ReviewRecord>> {
        Ok(self.reviews.read().await.get(session_id).cloned())
    }

    async fn list_reviews(&self, status: Option<ReviewStatus>) -> Result<Vec<ReviewRecord>> {
        let mut records: Vec<ReviewRecord> = self
            .reviews
            .read()
            .await
            .values()
            .filter(|r| status.map_or(true, |s| r.review_status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_review_fields(
        &self,
        session_id: &str,
        fields: VehicleFields,
    ) -> Result<ReviewRecord> {
        let mut reviews = self.reviews.write().await;
        let record = reviews
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        record.vehicle.apply(fields);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn mark_review_sent(&self, session_id: &str, supabase_id: &str) -> Result<ReviewRecord> {
        let mut reviews = self.reviews.write().await;
        let record = reviews
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        if record.is_sent() {
            return Err(AvatarError::AlreadySent(session_id.to_string()));
        }
        let now = Utc::now();
        record.review_status = ReviewStatus::Sent;
        record.supabase_id = Some(supabase_id.to_string());
        record.last_error = None;
        record.sent_at = Some(now);
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn record_forward_error(&self, session_id: &str, error: &str) -> Result<()> {
        let mut reviews = self.reviews.write().await;
        let record = reviews
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;
        record.last_error = Some(error.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn reset(&self) -> Result<ResetReport> {
        let mut transcripts = self.transcripts.write().await;
        let mut reviews = self.reviews.write().await;
        let report = ResetReport {
            transcripts_deleted: transcripts.len() as u64,
            reviews_deleted: reviews.len() as u64,
        };
        transcripts.clear();
        reviews.clear();
        Ok(report)
    }

    async fn health(&self) -> Result<String> {
        Ok(format!("memory ({} transcripts)", self.transcripts.read().await.len()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
