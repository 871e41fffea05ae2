use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use protogas_db::{migrations, DbPool};
use serde::Serialize;

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreCheck {
    pub status: &'static str,
    pub detail: String,
}

impl StoreCheck {
    fn ready(detail: String) -> Self {
        Self { status: READY, detail }
    }

    fn degraded(detail: String) -> Self {
        Self { status: DEGRADED, detail }
    }

    fn is_ready(&self) -> bool {
        self.status == READY
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Reads the customers table the tools depend on.
    pub database: StoreCheck,
    /// Migrations shipped with this build that the database lacks.
    pub schema: StoreCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Ready only when the customers table answers and no migration is pending.
/// Anything else answers 503.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = customers_check(&state.db_pool).await;
    let schema = schema_check(&state.db_pool).await;
    let ready = database.is_ready() && schema.is_ready();

    let payload = HealthResponse {
        status: if ready { READY } else { DEGRADED },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn customers_check(pool: &DbPool) -> StoreCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers").fetch_one(pool).await {
        Ok(count) => StoreCheck::ready(format!("customers table readable ({count} rows)")),
        Err(error) => StoreCheck::degraded(format!("customers table unreadable: {error}")),
    }
}

async fn schema_check(pool: &DbPool) -> StoreCheck {
    match migrations::pending_count(pool).await {
        Ok(0) => StoreCheck::ready("all migrations applied".to_string()),
        Ok(pending) => StoreCheck::degraded(format!("{pending} migrations pending")),
        Err(error) => StoreCheck::degraded(format!("migration ledger unreadable: {error}")),
    }
}
