//! Anti-forgery tokens for the browser-facing endpoints.
//!
//! A token is the first 10 hex chars of `SHA-256(secret:action:tick)` where
//! `tick` advances every half lifetime. The current and previous tick are
//! accepted, so a token lives between one half and one full lifetime.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::NonceConfig;

/// Nonce action for saving transcripts and fetching session tokens.
pub const TRANSCRIPT_ACTION: &str = "avatar_transcript";

/// Nonce action for every review-queue operation.
pub const REVIEW_ACTION: &str = "avatar_review";

const TOKEN_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct NonceIssuer {
    secret: String,
    lifetime_seconds: u64,
}

impl NonceIssuer {
    pub fn new(config: &NonceConfig) -> Self {
        if config.secret.is_empty() {
            tracing::warn!("nonce secret is empty; anti-forgery tokens are guessable");
        }
        Self {
            secret: config.secret.clone(),
            lifetime_seconds: config.lifetime_seconds.max(2),
        }
    }

    pub fn lifetime_seconds(&self) -> u64 {
        self.lifetime_seconds
    }

    pub fn issue(&self, action: &str) -> String {
        self.issue_at(action, Utc::now())
    }

    pub fn verify(&self, action: &str, token: &str) -> bool {
        self.verify_at(action, token, Utc::now())
    }

    pub fn issue_at(&self, action: &str, now: DateTime<Utc>) -> String {
        self.token_for_tick(action, self.tick(now))
    }

    pub fn verify_at(&self, action: &str, token: &str, now: DateTime<Utc>) -> bool {
        if token.len() != TOKEN_LEN {
            return false;
        }
        let tick = self.tick(now);
        [tick, tick.saturating_sub(1)]
            .iter()
            .any(|t| constant_time_eq(self.token_for_tick(action, *t).as_bytes(), token.as_bytes()))
    }

    fn tick(&self, now: DateTime<Utc>) -> u64 {
        let half = self.lifetime_seconds / 2;
        let secs = now.timestamp().max(0) as u64;
        secs.div_ceil(half)
    }

    fn token_for_tick(&self, action: &str, tick: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(action.as_bytes());
        hasher.update(b":");
        hasher.update(tick.to_string().as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..TOKEN_LEN].to_string()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
