use crate::context::AppContext;
use crate::subsystems::{review, session, transcripts};
use avatar_core::error::Result;
use avatar_core::extract_value;
use avatar_core::ipc::{ReviewRequest, ReviewResponse};
use serde::Serialize;

fn respond<T: Serialize>(result: Result<T>) -> ReviewResponse {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(v) => ReviewResponse::ok(v),
            Err(e) => ReviewResponse::err(format!("Serialization error: {}", e)),
        },
        Err(e) => e.into(),
    }
}

/// Dispatch one request. Shared by the HTTP API and the Unix socket.
pub async fn handle_request(request: ReviewRequest, ctx: &AppContext) -> ReviewResponse {
    let store = ctx.store.as_ref();

    match request {
        ReviewRequest::Ping => ReviewResponse::pong(),
        ReviewRequest::Health => match store.health().await {
            Ok(detail) => ReviewResponse::ok(serde_json::json!({
                "status": "healthy",
                "store": store.name(),
                "detail": detail,
                "forwarding": ctx.supabase.is_some(),
                "session_tokens": ctx.anam.is_some(),
            })),
            Err(e) => ReviewResponse::err(format!("Store health check failed: {}", e)),
        },
        ReviewRequest::SessionToken => respond(
            session::session_token(ctx.anam.as_ref())
                .await
                .map(|token| serde_json::json!({ "session_token": token })),
        ),
        ReviewRequest::SaveTranscript {
            session_id,
            messages,
            page_url,
        } => respond(transcripts::save_transcript(store, &session_id, &messages, page_url).await),
        ReviewRequest::GetTranscript { session_id } => {
            respond(transcripts::get_transcript(store, &session_id).await)
        }
        ReviewRequest::ListUnparsed => respond(transcripts::list_unparsed(store).await.map(
            |records| {
                serde_json::json!({
                    "count": records.len(),
                    "transcripts": records,
                })
            },
        )),
        ReviewRequest::Parse { session_id } => {
            respond(review::parse_session(store, &session_id).await)
        }
        ReviewRequest::Extract { text } => respond(extract_value(&text).map_err(Into::into)),
        ReviewRequest::List { status } => respond(review::list_reviews(store, status).await.map(
            |reviews| {
                serde_json::json!({
                    "count": reviews.len(),
                    "reviews": reviews,
                })
            },
        )),
        ReviewRequest::UpdateFields { session_id, fields } => {
            respond(review::update_fields(store, &session_id, &fields).await)
        }
        ReviewRequest::Forward { session_id } => {
            respond(review::forward(store, ctx.supabase.as_ref(), &ctx.forwarding, &session_id).await)
        }
        ReviewRequest::Reset => respond(review::reset(store).await),
    }
}
