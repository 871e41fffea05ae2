use std::sync::Arc;

use tracing::warn;

use protogas_core::domain::call_state::{CallState, CALL_STATE_TTL_SECS};
use protogas_db::repositories::{call_state_key, decode_call_state, CallStateCache};

/// Per-conversation session memory over a TTL cache.
///
/// Every read and write is best-effort: cache failures are logged and look
/// like an empty state, so a lost cache only costs the caller a repeated
/// question. Read-modify-write is unsynchronized; the last writer wins.
#[derive(Clone)]
pub struct CallStateStore {
    cache: Arc<dyn CallStateCache>,
    ttl_secs: u64,
}

impl CallStateStore {
    pub fn new(cache: Arc<dyn CallStateCache>) -> Self {
        Self::with_ttl(cache, CALL_STATE_TTL_SECS)
    }

    pub fn with_ttl(cache: Arc<dyn CallStateCache>, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub async fn get(&self, conversation_id: Option<&str>) -> CallState {
        let Some(conversation_id) = conversation_id else {
            return CallState::default();
        };

        let raw = match self.cache.get(&call_state_key(conversation_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CallState::default(),
            Err(error) => {
                warn!(
                    event_name = "gateway.call_state.read_failed",
                    conversation_id,
                    error = %error,
                    "call state read failed; continuing without session state"
                );
                return CallState::default();
            }
        };

        match decode_call_state(&raw) {
            Ok(state) => state,
            Err(error) => {
                warn!(
                    event_name = "gateway.call_state.decode_failed",
                    conversation_id,
                    error = %error,
                    "discarding unreadable call state"
                );
                CallState::default()
            }
        }
    }

    /// Replaces the state and restarts its idle window.
    pub async fn set(&self, conversation_id: Option<&str>, state: &CallState) {
        let Some(conversation_id) = conversation_id else {
            return;
        };

        let encoded = match serde_json::to_string(state) {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(
                    event_name = "gateway.call_state.encode_failed",
                    conversation_id,
                    error = %error,
                    "call state could not be encoded"
                );
                return;
            }
        };

        if let Err(error) =
            self.cache.set_with_ttl(&call_state_key(conversation_id), encoded, self.ttl_secs).await
        {
            warn!(
                event_name = "gateway.call_state.write_failed",
                conversation_id,
                error = %error,
                "call state write failed"
            );
        }
    }

    /// Overlays `partial` on the current state and writes the result back.
    pub async fn update(&self, conversation_id: Option<&str>, partial: CallState) -> CallState {
        let merged = self.get(conversation_id).await.merge(partial);
        self.set(conversation_id, &merged).await;
        merged
    }
}
