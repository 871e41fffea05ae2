pub mod config;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod phone;
pub mod pricing;

pub use domain::call_state::{CallState, CALL_STATE_TTL_SECS};
pub use domain::customer::{Customer, CustomerId, CustomerUpsert};
pub use domain::idempotency::{Fingerprint, IdempotencyRecord, RecordOutcome};
pub use domain::invocation::ToolInvocation;
pub use domain::order::{CylinderSize, NewOrder, Order, OrderId, OrderStatus};
pub use domain::summary::CallSummary;
pub use errors::{EnvelopeError, ToolError};
pub use metrics::{InMemoryToolMetrics, NoopToolMetrics, ToolMetrics, ToolOutcome};
pub use phone::{PhoneError, PhoneNormalizer};
pub use pricing::PriceList;
