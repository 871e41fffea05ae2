pub mod call_state;
pub mod customer;
pub mod idempotency;
pub mod invocation;
pub mod order;
pub mod summary;
