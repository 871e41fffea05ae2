//! Tool-call gateway for the voice ordering assistant.
//!
//! A webhook delivers one tool call per conversation turn. This crate turns
//! that call into exactly one spoken sentence:
//!
//! 1. **Envelope** (`envelope`) - normalize either request layout into a `ToolInvocation`
//! 2. **Replay check** (`idempotency`) - answer platform retries from the ledger
//! 3. **Routing** (`tools`) - resolve the wire name to a `ToolName`
//! 4. **Handlers** (`handlers`) - validate, read call state, hit the store, format
//! 5. **Reply** (`response`) - wrap the sentence in the platform's envelope
//!
//! `runtime::GatewayRuntime` strings these together and owns the rule that
//! no failure ever reaches the caller as anything but a sentence.

pub mod call_state;
pub mod envelope;
pub mod handlers;
pub mod idempotency;
pub mod response;
pub mod runtime;
pub mod summary;
pub mod tools;

pub use envelope::{parse_envelope, parse_envelope_value};
pub use response::{ErrorReply, ToolReply};
pub use runtime::{GatewayDependencies, GatewayRuntime, GatewaySettings, StoreCounts};
pub use summary::SummaryStatus;
pub use tools::ToolName;
