use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use thiserror::Error;

use protogas_core::domain::call_state::CallState;
use protogas_core::domain::customer::{Customer, CustomerId, CustomerUpsert};
use protogas_core::domain::idempotency::{Fingerprint, IdempotencyRecord, RecordOutcome};
use protogas_core::domain::order::{NewOrder, Order};
use protogas_core::domain::summary::CallSummary;
use protogas_core::errors::ToolError;

pub mod call_state;
pub mod call_summary;
pub mod customer;
pub mod idempotency;
pub mod memory;
pub mod order;

pub use call_state::SqlCallStateCache;
pub use call_summary::SqlCallSummaryRepository;
pub use customer::SqlCustomerRepository;
pub use idempotency::SqlIdempotencyRepository;
pub use memory::{
    InMemoryCallStateCache, InMemoryCallSummaryRepository, InMemoryCustomerRepository,
    InMemoryIdempotencyRepository, InMemoryOrderRepository,
};
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ToolError {
    fn from(value: RepositoryError) -> Self {
        ToolError::Store(value.to_string())
    }
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError>;

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;

    /// Inserts a customer, or updates name/address/email of the customer that
    /// already owns `phone`. Returns the stored row either way.
    async fn upsert(&self, customer: CustomerUpsert) -> Result<Customer, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn find_latest_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRecord>, RepositoryError>;

    /// Writes the record unless one with the same fingerprint exists, in which
    /// case the stored record is left untouched.
    async fn insert(&self, record: IdempotencyRecord) -> Result<RecordOutcome, RepositoryError>;

    /// Deletes records created before `cutoff`, returning how many were removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// String cache with per-key expiry, used for per-conversation call state.
#[async_trait]
pub trait CallStateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CallSummaryRepository: Send + Sync {
    async fn save(&self, summary: CallSummary) -> Result<(), RepositoryError>;
}

/// Cache key for a conversation's call state.
pub fn call_state_key(conversation_id: &str) -> String {
    format!("call_state:{conversation_id}")
}

pub fn decode_call_state(raw: &str) -> Result<CallState, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid call state payload: {error}")))
}

/// Current time at the precision timestamps are stored with.
pub(crate) fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so stored timestamps also sort correctly as text.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_uuid(column: &str, value: String) -> Result<uuid::Uuid, RepositoryError> {
    uuid::Uuid::parse_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid uuid in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}
