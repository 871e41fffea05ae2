mod bootstrap;
mod health;
mod metrics;
mod routes;
mod sweep;

use std::time::Duration;

use anyhow::Result;
use protogas_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;

use crate::routes::AppState;

fn init_logging(config: &AppConfig) {
    use protogas_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let sweeper = sweep::spawn(
        app.db_pool.clone(),
        app.config.idempotency.retention_days,
        app.config.idempotency.sweep_interval_secs,
    );

    let router = routes::router(
        AppState { runtime: app.runtime.clone(), metrics: app.metrics.clone() },
        app.db_pool.clone(),
        app.config.server.enable_test_tools,
    );
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        test_tools = app.config.server.enable_test_tools,
        "protogas gateway listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        served = &mut server => {
            served??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "protogas gateway draining in-flight requests"
    );
    let _ = stop_tx.send(());
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(served) => served??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish before the grace period"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
