use std::sync::Arc;

use protogas_core::config::{AppConfig, CallStateBackend, ConfigError, LoadOptions};
use protogas_db::repositories::{
    CallStateCache, InMemoryCallStateCache, SqlCallStateCache, SqlCallSummaryRepository,
    SqlCustomerRepository, SqlIdempotencyRepository, SqlOrderRepository,
};
use protogas_db::{connect_with_settings, migrations, DbPool};
use protogas_gateway::{GatewayDependencies, GatewayRuntime, GatewaySettings};
use thiserror::Error;
use tracing::info;

use crate::metrics::PrometheusToolMetrics;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: GatewayRuntime,
    pub metrics: PrometheusToolMetrics,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("metrics registry setup failed: {0}")]
    Metrics(#[source] prometheus::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let call_state: Arc<dyn CallStateCache> = match config.call_state.backend {
        CallStateBackend::Memory => Arc::new(InMemoryCallStateCache::default()),
        CallStateBackend::Database => Arc::new(SqlCallStateCache::new(db_pool.clone())),
    };
    info!(
        event_name = "system.bootstrap.call_state_backend",
        correlation_id = "bootstrap",
        backend = ?config.call_state.backend,
        ttl_secs = config.call_state.ttl_secs,
        "call state backend selected"
    );

    let phone = config.phone.normalizer()?;
    let metrics = PrometheusToolMetrics::new().map_err(BootstrapError::Metrics)?;
    let runtime = GatewayRuntime::new(
        GatewayDependencies {
            customers: Arc::new(SqlCustomerRepository::new(db_pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(db_pool.clone())),
            idempotency: Arc::new(SqlIdempotencyRepository::new(db_pool.clone())),
            call_state,
            summaries: Arc::new(SqlCallSummaryRepository::new(db_pool.clone())),
            metrics: Arc::new(metrics.clone()),
        },
        GatewaySettings {
            prices: config.pricing.clone(),
            phone,
            call_state_ttl_secs: config.call_state.ttl_secs,
        },
    );

    Ok(Application { config, db_pool, runtime, metrics })
}
