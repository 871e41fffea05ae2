use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use protogas_core::domain::summary::CallSummary;
use protogas_db::repositories::CallSummaryRepository;

use crate::call_state::CallStateStore;
use crate::envelope::conversation_id;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryStatus {
    Ok,
    Ignored,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Ignored => "ignored",
        }
    }
}

/// Stores end-of-call reports. Persistence is best-effort: the platform only
/// learns whether the report named a conversation.
#[derive(Clone)]
pub struct SummaryIngestor {
    summaries: Arc<dyn CallSummaryRepository>,
    call_state: CallStateStore,
}

impl SummaryIngestor {
    pub fn new(summaries: Arc<dyn CallSummaryRepository>, call_state: CallStateStore) -> Self {
        Self { summaries, call_state }
    }

    pub async fn ingest(&self, body: &Value) -> SummaryStatus {
        let Some(conversation_id) = conversation_id(body) else {
            info!(
                event_name = "gateway.summary.ignored",
                "end-of-call report without a conversation id"
            );
            return SummaryStatus::Ignored;
        };

        let report = body.get("message").filter(|message| message.is_object()).unwrap_or(body);
        let started_at = timestamp_field(report, "startedAt");
        let ended_at = timestamp_field(report, "endedAt");
        let state = self.call_state.get(Some(&conversation_id)).await;

        let summary = CallSummary {
            conversation_id: conversation_id.clone(),
            customer_id: state.customer_id,
            started_at,
            ended_at,
            duration_seconds: CallSummary::compute_duration(started_at, ended_at),
            transcript: transcript(report),
            ended_reason: report.get("endedReason").and_then(Value::as_str).map(str::to_string),
            created_at: Utc::now(),
        };

        match self.summaries.save(summary).await {
            Ok(()) => info!(
                event_name = "gateway.summary.saved",
                conversation_id = %conversation_id,
                "call summary saved"
            ),
            Err(error) => warn!(
                event_name = "gateway.summary.save_failed",
                conversation_id = %conversation_id,
                error = %error,
                "call summary was not persisted"
            ),
        }

        SummaryStatus::Ok
    }
}

fn timestamp_field(report: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = report.get(key).and_then(Value::as_str)?;
    DateTime::parse_from_rfc3339(raw).ok().map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Transcript text from `transcript` or `artifact.transcript`. A list of
/// `{role, message}` turns is rendered one `role: message` line per turn.
fn transcript(report: &Value) -> String {
    let raw = report
        .get("transcript")
        .or_else(|| report.get("artifact").and_then(|artifact| artifact.get("transcript")));

    match raw {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(turns)) => turns
            .iter()
            .filter_map(|turn| {
                let message = turn.get("message").and_then(Value::as_str)?;
                let role = turn.get("role").and_then(Value::as_str).unwrap_or("unknown");
                Some(format!("{role}: {message}"))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
