use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use protogas_core::domain::idempotency::{Fingerprint, IdempotencyRecord, RecordOutcome};
use protogas_db::repositories::IdempotencyRepository;

/// Replay protection for tool calls the platform may retry.
///
/// Lookup and record are separate round trips, so two concurrent first
/// deliveries can both execute. The ledger's unique fingerprint keeps only
/// the first reply.
#[derive(Clone)]
pub struct IdempotencyGuard {
    ledger: Arc<dyn IdempotencyRepository>,
}

impl IdempotencyGuard {
    pub fn new(ledger: Arc<dyn IdempotencyRepository>) -> Self {
        Self { ledger }
    }

    pub fn fingerprint(
        conversation_id: Option<&str>,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Fingerprint {
        Fingerprint::compute(conversation_id, tool_name, arguments)
    }

    /// Stored reply for `fingerprint`. Ledger failures count as a miss.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<String> {
        match self.ledger.find(fingerprint).await {
            Ok(record) => record.map(|record| record.result),
            Err(error) => {
                warn!(
                    event_name = "gateway.idempotency.lookup_failed",
                    fingerprint = %fingerprint,
                    error = %error,
                    "idempotency lookup failed; executing tool call"
                );
                None
            }
        }
    }

    /// Persists `result` for `fingerprint`. Failures are logged and dropped.
    pub async fn record(
        &self,
        fingerprint: Fingerprint,
        tool_name: &str,
        conversation_id: Option<&str>,
        arguments: &Map<String, Value>,
        result: &str,
    ) {
        let record = IdempotencyRecord {
            fingerprint: fingerprint.clone(),
            tool_name: tool_name.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            arguments: Value::Object(arguments.clone()),
            result: result.to_string(),
            created_at: Utc::now(),
        };

        match self.ledger.insert(record).await {
            Ok(RecordOutcome::Inserted) => {}
            Ok(RecordOutcome::AlreadyRecorded) => {
                debug!(
                    event_name = "gateway.idempotency.already_recorded",
                    fingerprint = %fingerprint,
                    tool_name,
                    "concurrent delivery already recorded a reply"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "gateway.idempotency.record_failed",
                    fingerprint = %fingerprint,
                    tool_name,
                    error = %error,
                    "idempotency record was not persisted"
                );
            }
        }
    }
}
