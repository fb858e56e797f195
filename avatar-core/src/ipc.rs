use serde::{Deserialize, Serialize};

use crate::error::AvatarError;
use crate::models::ReviewStatus;

/// Requests understood by the router, shared by the HTTP and IPC transports.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewRequest {
    Ping,
    Health,
    SessionToken,
    SaveTranscript {
        session_id: String,
        /// JSON array, or a string holding one.
        messages: serde_json::Value,
        #[serde(default)]
        page_url: Option<String>,
    },
    GetTranscript {
        session_id: String,
    },
    ListUnparsed,
    Parse {
        session_id: String,
    },
    Extract {
        text: serde_json::Value,
    },
    List {
        #[serde(default)]
        status: Option<ReviewStatus>,
    },
    UpdateFields {
        session_id: String,
        fields: serde_json::Value,
    },
    Forward {
        session_id: String,
    },
    Reset,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReviewResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Machine-readable error class, see `AvatarError::code`.
    #[serde(default)]
    pub code: Option<String>,
    pub version: String,
}

impl ReviewResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            code: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self::err_with_code("internal", msg)
    }

    pub fn err_with_code(code: &str, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            code: Some(code.to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl From<AvatarError> for ReviewResponse {
    fn from(e: AvatarError) -> Self {
        Self::err_with_code(e.code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagging() {
        let req: ReviewRequest = serde_json::from_value(serde_json::json!({
            "action": "list",
            "status": "pending"
        }))
        .unwrap();
        assert!(matches!(
            req,
            ReviewRequest::List {
                status: Some(ReviewStatus::Pending)
            }
        ));

        let req: ReviewRequest =
            serde_json::from_value(serde_json::json!({"action": "reset"})).unwrap();
        assert!(matches!(req, ReviewRequest::Reset));
    }

    #[test]
    fn test_list_status_optional() {
        let req: ReviewRequest =
            serde_json::from_value(serde_json::json!({"action": "list"})).unwrap();
        assert!(matches!(req, ReviewRequest::List { status: None }));
    }

    #[test]
    fn test_error_response_carries_code() {
        let resp: ReviewResponse = AvatarError::AlreadySent("s1".into()).into();
        assert!(!resp.is_ok());
        assert_eq!(resp.code.as_deref(), Some("already_sent"));
        assert!(resp.error.unwrap().contains("s1"));
    }

    #[test]
    fn test_msgpack_frame_round_trip() {
        let req = ReviewRequest::Forward {
            session_id: "abc".into(),
        };
        let bytes = rmp_serde::to_vec_named(&req).unwrap();
        let back: ReviewRequest = rmp_serde::from_slice(&bytes).unwrap();
        assert!(matches!(back, ReviewRequest::Forward { session_id } if session_id == "abc"));
    }
}
