use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

/// End-of-call report kept for follow-up, one row per conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSummary {
    pub conversation_id: String,
    pub customer_id: Option<CustomerId>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub transcript: String,
    pub ended_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallSummary {
    pub fn compute_duration(
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Option<i64> {
        match (started_at, ended_at) {
            (Some(start), Some(end)) if end >= start => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}
