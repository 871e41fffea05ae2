use sqlx::{sqlite::SqliteRow, Row};

use protogas_core::domain::customer::CustomerId;
use protogas_core::domain::summary::CallSummary;

use super::{
    encode_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid,
    CallSummaryRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlCallSummaryRepository {
    pool: DbPool,
}

impl SqlCallSummaryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, conversation_id: &str) -> Result<Option<CallSummary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                conversation_id,
                customer_id,
                started_at,
                ended_at,
                duration_seconds,
                transcript,
                ended_reason,
                created_at
             FROM call_summaries
             WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(summary_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl CallSummaryRepository for SqlCallSummaryRepository {
    /// A repeated end-of-call report for the same conversation replaces the
    /// earlier one.
    async fn save(&self, summary: CallSummary) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO call_summaries (
                conversation_id,
                customer_id,
                started_at,
                ended_at,
                duration_seconds,
                transcript,
                ended_reason,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(conversation_id) DO UPDATE SET
                customer_id = COALESCE(excluded.customer_id, call_summaries.customer_id),
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                duration_seconds = excluded.duration_seconds,
                transcript = excluded.transcript,
                ended_reason = excluded.ended_reason",
        )
        .bind(&summary.conversation_id)
        .bind(summary.customer_id.map(|id| id.to_string()))
        .bind(summary.started_at.map(encode_timestamp))
        .bind(summary.ended_at.map(encode_timestamp))
        .bind(summary.duration_seconds)
        .bind(&summary.transcript)
        .bind(summary.ended_reason.as_deref())
        .bind(encode_timestamp(summary.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn summary_from_row(row: SqliteRow) -> Result<CallSummary, RepositoryError> {
    let customer_id: Option<String> = row.try_get("customer_id")?;

    Ok(CallSummary {
        conversation_id: row.try_get("conversation_id")?,
        customer_id: customer_id
            .map(|id| parse_uuid("customer_id", id).map(CustomerId))
            .transpose()?,
        started_at: parse_optional_timestamp("started_at", row.try_get("started_at")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
        duration_seconds: row.try_get("duration_seconds")?,
        transcript: row.try_get("transcript")?,
        ended_reason: row.try_get("ended_reason")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
