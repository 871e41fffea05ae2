use std::time::Duration;

use protogas_db::{retention, DbPool};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawns the periodic retention pass. Returns `None` when `interval_secs`
/// is zero.
pub fn spawn(db_pool: DbPool, retention_days: u32, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!(
            event_name = "system.sweep.disabled",
            correlation_id = "bootstrap",
            "retention sweep disabled"
        );
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            run_once(&db_pool, retention_days).await;
        }
    }))
}

pub async fn run_once(db_pool: &DbPool, retention_days: u32) {
    match retention::sweep(db_pool, retention_days).await {
        Ok(report) => info!(
            event_name = "system.sweep.completed",
            correlation_id = "sweep",
            idempotency_records = report.idempotency_records,
            call_state_entries = report.call_state_entries,
            retention_days,
            "retention sweep completed"
        ),
        Err(error) => warn!(
            event_name = "system.sweep.failed",
            correlation_id = "sweep",
            error = %error,
            "retention sweep failed"
        ),
    }
}
