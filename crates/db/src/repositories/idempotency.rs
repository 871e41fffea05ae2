use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use protogas_core::domain::idempotency::{Fingerprint, IdempotencyRecord, RecordOutcome};

use super::{encode_timestamp, parse_timestamp, IdempotencyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIdempotencyRepository {
    pool: DbPool,
}

impl SqlIdempotencyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IdempotencyRepository for SqlIdempotencyRepository {
    async fn find(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT fingerprint, tool_name, conversation_id, arguments_json, result, created_at
             FROM idempotency_records
             WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn insert(&self, record: IdempotencyRecord) -> Result<RecordOutcome, RepositoryError> {
        let arguments_json = serde_json::to_string(&record.arguments).map_err(|error| {
            RepositoryError::Decode(format!("cannot encode idempotency arguments: {error}"))
        })?;

        let result = sqlx::query(
            "INSERT INTO idempotency_records (
                fingerprint,
                tool_name,
                conversation_id,
                arguments_json,
                result,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint) DO NOTHING",
        )
        .bind(record.fingerprint.as_str())
        .bind(&record.tool_name)
        .bind(record.conversation_id.as_deref())
        .bind(arguments_json)
        .bind(&record.result)
        .bind(encode_timestamp(record.created_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(RecordOutcome::AlreadyRecorded)
        } else {
            Ok(RecordOutcome::Inserted)
        }
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE created_at < ?")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn record_from_row(row: SqliteRow) -> Result<IdempotencyRecord, RepositoryError> {
    let arguments_json: String = row.try_get("arguments_json")?;
    let arguments = serde_json::from_str(&arguments_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid json in `arguments_json`: {error}"))
    })?;

    Ok(IdempotencyRecord {
        fingerprint: Fingerprint(row.try_get("fingerprint")?),
        tool_name: row.try_get("tool_name")?,
        conversation_id: row.try_get("conversation_id")?,
        arguments,
        result: row.try_get("result")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
