use crate::commands::{with_database, CommandFailure, CommandResult};
use protogas_db::{migrations, retention};

/// One retention pass using `idempotency.retention_days` unless overridden.
pub fn run(retention_days: Option<u32>) -> CommandResult {
    let result = with_database("sweep", |config, pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let days = retention_days.unwrap_or(config.idempotency.retention_days);
        let report = retention::sweep(&pool, days)
            .await
            .map_err(|error| ("sweep", error.to_string(), 6u8))?;
        Ok::<_, CommandFailure>((days, report))
    });

    match result {
        Ok((days, report)) => CommandResult::success(
            "sweep",
            format!(
                "removed {} replay record(s) older than {days} day(s) and {} expired call state entr{}",
                report.idempotency_records,
                report.call_state_entries,
                if report.call_state_entries == 1 { "y" } else { "ies" },
            ),
        ),
        Err(failure) => failure,
    }
}
