use chrono::{Duration, Utc};
use serde::Serialize;

use crate::repositories::{
    IdempotencyRepository, RepositoryError, SqlCallStateCache, SqlIdempotencyRepository,
};
use crate::DbPool;

/// Rows removed by one retention pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub idempotency_records: u64,
    pub call_state_entries: u64,
}

/// Drops ledger rows older than `retention_days` and call-state rows past
/// their expiry. Safe to run while the gateway is serving.
///
/// A window reaching past the earliest representable date keeps every
/// ledger row.
pub async fn sweep(pool: &DbPool, retention_days: u32) -> Result<RetentionReport, RepositoryError> {
    let cutoff = Utc::now().checked_sub_signed(Duration::days(i64::from(retention_days)));
    let idempotency_records = match cutoff {
        Some(cutoff) => SqlIdempotencyRepository::new(pool.clone()).purge_before(cutoff).await?,
        None => 0,
    };
    let call_state_entries = SqlCallStateCache::new(pool.clone()).purge_expired().await?;

    Ok(RetentionReport { idempotency_records, call_state_entries })
}
