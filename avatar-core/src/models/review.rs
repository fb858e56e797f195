use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AvatarError, Result};
use crate::models::transcript::TranscriptRecord;
use crate::models::vehicle::ExtractedVehicleData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Sent,
    Error,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Sent => "sent",
            ReviewStatus::Error => "error",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = AvatarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "sent" => Ok(ReviewStatus::Sent),
            "error" => Ok(ReviewStatus::Error),
            other => Err(AvatarError::Validation(format!("unknown review status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub session_id: String,
    pub vehicle: ExtractedVehicleData,
    pub review_status: ReviewStatus,
    pub supabase_id: Option<String>,
    pub last_error: Option<String>,
    pub page_url: Option<String>,
    pub conversation_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    /// A fresh pending review for a freshly parsed transcript.
    pub fn from_extraction(transcript: &TranscriptRecord, vehicle: ExtractedVehicleData) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: transcript.session_id.clone(),
            vehicle,
            review_status: ReviewStatus::Pending,
            supabase_id: None,
            last_error: None,
            page_url: transcript.page_url.clone(),
            conversation_date: Some(transcript.created_at),
            created_at: now,
            updated_at: now,
            sent_at: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.review_status == ReviewStatus::Sent
    }
}
