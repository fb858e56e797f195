pub mod anam;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ipc;
pub mod models;
pub mod nonce;
pub mod pg_store;
pub mod store;
pub mod supabase;

pub use anam::{AnamClient, SessionTokenError};
pub use config::AvatarConfig;
pub use error::AvatarError;
pub use extract::{extract, extract_value, transcript_text, ExtractError, Make};
pub use nonce::{NonceIssuer, REVIEW_ACTION, TRANSCRIPT_ACTION};
pub use store::{create_store, MemoryStore, ResetReport, TranscriptStore};
pub use supabase::{ForwardError, ForwardPayload, SupabaseClient};
