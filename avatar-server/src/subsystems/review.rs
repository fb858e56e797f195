//! Review queue: parse, correct and forward extracted vehicle data
//!
//! State machine per session:
//! - `pending --(forward ok)--> sent`
//! - `pending --(forward failure)--> pending` (error recorded, surfaced, not retried)
//! - nothing leaves `sent`

use avatar_core::error::{AvatarError, Result};
use avatar_core::models::{validate_session_id, ReviewRecord, ReviewStatus, VehicleFields};
use avatar_core::{
    extract, transcript_text, ForwardError, ForwardPayload, ResetReport, SupabaseClient,
    TranscriptStore,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Sessions with a forward currently on the wire. Shared by every transport
/// so a double submit cannot produce two Supabase rows.
#[derive(Debug, Clone, Default)]
pub struct ForwardClaims {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ForwardClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when the session is already claimed.
    fn claim(&self, session_id: &str) -> Option<ForwardClaim> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(session_id.to_string()) {
            return None;
        }
        Some(ForwardClaim {
            claims: self.clone(),
            session_id: session_id.to_string(),
        })
    }
}

/// Released on drop, whatever the forward outcome.
struct ForwardClaim {
    claims: ForwardClaims,
    session_id: String,
}

impl Drop for ForwardClaim {
    fn drop(&mut self) {
        let mut set = self.claims.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.session_id);
    }
}

async fn require_review(store: &dyn TranscriptStore, session_id: &str) -> Result<ReviewRecord> {
    store
        .get_review(session_id)
        .await?
        .ok_or_else(|| AvatarError::NotFound(format!("review for session {}", session_id)))
}

/// Run extraction over a stored transcript and (re)create its pending review.
pub async fn parse_session(store: &dyn TranscriptStore, session_id: &str) -> Result<ReviewRecord> {
    let session_id = validate_session_id(session_id)?;

    let transcript = store
        .get_transcript(session_id)
        .await?
        .ok_or_else(|| AvatarError::NotFound(format!("session {}", session_id)))?;

    if let Some(existing) = store.get_review(session_id).await? {
        if existing.is_sent() {
            return Err(AvatarError::AlreadySent(session_id.to_string()));
        }
    }

    let vehicle = extract(&transcript_text(&transcript.messages));
    let review = store
        .upsert_review(&ReviewRecord::from_extraction(&transcript, vehicle))
        .await?;
    store.mark_parsed(session_id).await?;

    tracing::info!(
        session_id,
        label = %review.vehicle.label,
        year = ?review.vehicle.year,
        make = ?review.vehicle.make,
        vin = ?review.vehicle.vin,
        "Transcript parsed"
    );
    Ok(review)
}

pub async fn list_reviews(
    store: &dyn TranscriptStore,
    status: Option<ReviewStatus>,
) -> Result<Vec<ReviewRecord>> {
    store.list_reviews(status).await
}

/// Overwrite the extracted fields with operator input (coerced to strings).
pub async fn update_fields(
    store: &dyn TranscriptStore,
    session_id: &str,
    fields: &Value,
) -> Result<ReviewRecord> {
    let session_id = validate_session_id(session_id)?;
    let fields = VehicleFields::from_value(fields)?;
    let review = store.update_review_fields(session_id, fields).await?;

    tracing::info!(session_id, "Review fields updated manually");
    Ok(review)
}

/// One-shot forward to Supabase.
///
/// A `sent` review fails with `AlreadySent` before any request is made. A
/// forward that overlaps another for the same session fails with
/// `ForwardInProgress`.
pub async fn forward(
    store: &dyn TranscriptStore,
    sink: Option<&SupabaseClient>,
    claims: &ForwardClaims,
    session_id: &str,
) -> Result<ReviewRecord> {
    let session_id = validate_session_id(session_id)?;
    let _claim = claims
        .claim(session_id)
        .ok_or_else(|| AvatarError::ForwardInProgress(session_id.to_string()))?;
    let review = require_review(store, session_id).await?;

    if review.is_sent() {
        return Err(AvatarError::AlreadySent(session_id.to_string()));
    }

    let sink = sink.ok_or(AvatarError::Forward(ForwardError::NotConfigured))?;
    let payload = ForwardPayload::from_review(&review, Utc::now());

    match sink.insert(&payload).await {
        Ok(supabase_id) => {
            let sent = store.mark_review_sent(session_id, &supabase_id).await?;
            tracing::info!(session_id, supabase_id = %supabase_id, "Review forwarded");
            Ok(sent)
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "Forward failed; review stays pending");
            store.record_forward_error(session_id, &e.to_string()).await?;
            Err(e.into())
        }
    }
}

/// Administrative reset: delete every transcript and review.
pub async fn reset(store: &dyn TranscriptStore) -> Result<ResetReport> {
    let report = store.reset().await?;
    tracing::warn!(
        transcripts = report.transcripts_deleted,
        reviews = report.reviews_deleted,
        "All transcript data deleted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::config::{HttpClientConfig, SupabaseConfig};
    use avatar_core::models::ExtractionLabel;
    use avatar_core::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn seeded_store(session_id: &str, text: &str) -> MemoryStore {
        let store = MemoryStore::new();
        crate::subsystems::transcripts::save_transcript(
            &store,
            session_id,
            &json!([{"speaker": "user", "text": text}]),
            Some("https://dealer.example/trade-in".into()),
        )
        .await
        .unwrap();
        store
    }

    fn sink_for(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(
            &SupabaseConfig {
                url: server.uri(),
                api_key: "key".to_string(),
                table: "vehicle_leads".to_string(),
            },
            &HttpClientConfig { timeout_seconds: 5 },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_parse_creates_pending_review() {
        let store = seeded_store("s1", "My 2021 Honda Civic, VIN 1HGCM82633A004352").await;

        let review = parse_session(&store, "s1").await.unwrap();
        assert_eq!(review.review_status, ReviewStatus::Pending);
        assert_eq!(review.vehicle.year.as_deref(), Some("2021"));
        assert_eq!(review.vehicle.make.as_deref(), Some("Honda"));
        assert_eq!(review.vehicle.model.as_deref(), Some("Civic,"));
        assert_eq!(review.vehicle.vin.as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(review.page_url.as_deref(), Some("https://dealer.example/trade-in"));

        let transcript = store.get_transcript("s1").await.unwrap().unwrap();
        assert!(transcript.parsed);
    }

    #[tokio::test]
    async fn test_parse_no_data_is_not_an_error() {
        let store = seeded_store("s1", "Just browsing, thanks").await;
        let review = parse_session(&store, "s1").await.unwrap();
        assert!(review.vehicle.is_empty());
        assert_eq!(review.vehicle.label, ExtractionLabel::NoDataFound);
    }

    #[tokio::test]
    async fn test_parse_missing_transcript() {
        let store = MemoryStore::new();
        assert!(matches!(
            parse_session(&store, "nope").await,
            Err(AvatarError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_fields_then_forward() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/vehicle_leads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 12}])))
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink_for(&server);

        let store = seeded_store("s1", "My 2021 Honda Civic, VIN 1HGCM82633A004352").await;
        parse_session(&store, "s1").await.unwrap();

        let edited = update_fields(
            &store,
            "s1",
            &json!({"year": 2021, "make": "Honda", "model": "Civic", "vin": "1HGCM82633A004352"}),
        )
        .await
        .unwrap();
        assert_eq!(edited.vehicle.model.as_deref(), Some("Civic"));
        assert_eq!(edited.vehicle.label, ExtractionLabel::ManualEdit);

        let sent = forward(&store, Some(&sink), &ForwardClaims::new(), "s1").await.unwrap();
        assert_eq!(sent.review_status, ReviewStatus::Sent);
        assert_eq!(sent.supabase_id.as_deref(), Some("12"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "Civic");
        assert_eq!(body["year"], "2021");
        assert_eq!(body["page_url"], "https://dealer.example/trade-in");
        assert!(body["processed_at"].is_string());
        assert!(body["conversation_date"].is_string());
    }

    #[tokio::test]
    async fn test_forward_already_sent_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink_for(&server);

        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();
        forward(&store, Some(&sink), &ForwardClaims::new(), "s1").await.unwrap();

        let err = forward(&store, Some(&sink), &ForwardClaims::new(), "s1").await.unwrap_err();
        assert!(matches!(err, AvatarError::AlreadySent(_)));
        // MockServer verifies `.expect(1)` on drop: the second call never hit the wire
    }

    #[tokio::test]
    async fn test_concurrent_forwards_post_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([{"id": 7}]))
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink_for(&server);
        let claims = ForwardClaims::new();

        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();

        let (a, b) = tokio::join!(
            forward(&store, Some(&sink), &claims, "s1"),
            forward(&store, Some(&sink), &claims, "s1")
        );
        let (sent, rejected) = if a.is_ok() { (a, b) } else { (b, a) };
        assert_eq!(sent.unwrap().supabase_id.as_deref(), Some("7"));
        assert!(matches!(rejected, Err(AvatarError::ForwardInProgress(_))));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        // The claim is released: a later attempt sees the sent state
        let err = forward(&store, Some(&sink), &claims, "s1").await.unwrap_err();
        assert!(matches!(err, AvatarError::AlreadySent(_)));
    }

    #[tokio::test]
    async fn test_forward_failure_stays_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database is down"))
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink_for(&server);

        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();

        let err = forward(&store, Some(&sink), &ForwardClaims::new(), "s1").await.unwrap_err();
        assert_eq!(err.code(), "upstream");
        assert!(err.to_string().contains("database is down"));

        let review = store.get_review("s1").await.unwrap().unwrap();
        assert_eq!(review.review_status, ReviewStatus::Pending);
        assert!(review.supabase_id.is_none());
        assert!(review.last_error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_forward_without_sink() {
        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();

        let err = forward(&store, None, &ForwardClaims::new(), "s1").await.unwrap_err();
        assert_eq!(err.code(), "not_configured");
        let review = store.get_review("s1").await.unwrap().unwrap();
        assert_eq!(review.review_status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_forward_unknown_session() {
        let store = MemoryStore::new();
        assert!(matches!(
            forward(&store, None, &ForwardClaims::new(), "ghost").await,
            Err(AvatarError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reparse_after_sent_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 3}])))
            .mount(&server)
            .await;
        let sink = sink_for(&server);

        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();
        forward(&store, Some(&sink), &ForwardClaims::new(), "s1").await.unwrap();

        assert!(matches!(
            parse_session(&store, "s1").await,
            Err(AvatarError::AlreadySent(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_reset() {
        let store = seeded_store("s1", "2019 Subaru Outback").await;
        parse_session(&store, "s1").await.unwrap();

        let pending = list_reviews(&store, Some(ReviewStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);

        let report = reset(&store).await.unwrap();
        assert_eq!(report.reviews_deleted, 1);
        assert!(list_reviews(&store, None).await.unwrap().is_empty());
    }
}
