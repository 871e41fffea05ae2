use chrono::{Duration, Utc};
use sqlx::Row;

use super::{encode_timestamp, CallStateCache, RepositoryError};
use crate::DbPool;

/// Call-state cache backed by the `call_state` table.
///
/// Expired rows are invisible to `get` and are overwritten by the next
/// `set_with_ttl`; `purge_expired` reclaims the rest.
pub struct SqlCallStateCache {
    pool: DbPool,
}

impl SqlCallStateCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM call_state WHERE expires_at <= ?")
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CallStateCache for SqlCallStateCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM call_state WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(encode_timestamp(Utc::now()))
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get("value").map_err(RepositoryError::from)).transpose()
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> Result<(), RepositoryError> {
        let ttl = i64::try_from(ttl_secs)
            .map_err(|_| RepositoryError::Decode(format!("ttl out of range: {ttl_secs}")))?;
        let expires_at = Utc::now() + Duration::seconds(ttl);

        sqlx::query(
            "INSERT INTO call_state (key, value, expires_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(encode_timestamp(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
