use std::sync::Arc;

use avatar_core::{AnamClient, AvatarConfig, MemoryStore, SupabaseClient, TranscriptStore};

use crate::subsystems::review::ForwardClaims;

/// Everything a request handler needs, passed explicitly instead of globals.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn TranscriptStore>,
    pub config: AvatarConfig,
    pub supabase: Option<SupabaseClient>,
    pub anam: Option<AnamClient>,
    pub forwarding: ForwardClaims,
}

impl AppContext {
    /// Build the outbound clients from config. Missing credentials leave the
    /// client unset; the matching operation then fails as not configured.
    pub fn new(store: Arc<dyn TranscriptStore>, config: AvatarConfig) -> Self {
        let supabase = match SupabaseClient::new(&config.supabase, &config.http_client) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Forwarding disabled: {}", e);
                None
            }
        };
        let anam = match AnamClient::new(&config.anam, &config.http_client) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!("Session-token relay disabled: {}", e);
                None
            }
        };

        Self {
            store,
            config,
            supabase,
            anam,
            forwarding: ForwardClaims::new(),
        }
    }

    /// In-memory context for tests and local development.
    pub fn in_memory(config: AvatarConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}
