use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use protogas_core::domain::call_state::CALL_STATE_TTL_SECS;
use protogas_core::domain::invocation::ToolInvocation;
use protogas_core::errors::ToolError;
use protogas_core::metrics::{ToolMetrics, ToolOutcome, UNKNOWN_TOOL_LABEL};
use protogas_core::phone::PhoneNormalizer;
use protogas_core::pricing::PriceList;
use protogas_db::repositories::{
    CallStateCache, CallSummaryRepository, CustomerRepository, IdempotencyRepository,
    OrderRepository, RepositoryError,
};

use crate::call_state::CallStateStore;
use crate::handlers::ToolContext;
use crate::idempotency::IdempotencyGuard;
use crate::summary::{SummaryIngestor, SummaryStatus};
use crate::tools::{unknown_tool_reply, ToolName};

/// Storage and telemetry handles the runtime is built from.
pub struct GatewayDependencies {
    pub customers: Arc<dyn CustomerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    pub call_state: Arc<dyn CallStateCache>,
    pub summaries: Arc<dyn CallSummaryRepository>,
    pub metrics: Arc<dyn ToolMetrics>,
}

#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub prices: PriceList,
    pub phone: PhoneNormalizer,
    pub call_state_ttl_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            prices: PriceList::default(),
            phone: PhoneNormalizer::default(),
            call_state_ttl_secs: CALL_STATE_TTL_SECS,
        }
    }
}

/// Row counts behind the manual store check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreCounts {
    pub customers: u64,
    pub orders: u64,
}

/// Answers tool calls: replay check, dispatch, error-to-speech, metrics.
///
/// Every path returns a sentence. Only a panic escapes, and the HTTP layer
/// owns turning that into a reply.
#[derive(Clone)]
pub struct GatewayRuntime {
    context: ToolContext,
    guard: IdempotencyGuard,
    summaries: SummaryIngestor,
    metrics: Arc<dyn ToolMetrics>,
}

impl GatewayRuntime {
    pub fn new(dependencies: GatewayDependencies, settings: GatewaySettings) -> Self {
        let call_state =
            CallStateStore::with_ttl(dependencies.call_state, settings.call_state_ttl_secs);
        Self {
            context: ToolContext {
                customers: dependencies.customers,
                orders: dependencies.orders,
                call_state: call_state.clone(),
                prices: settings.prices,
                phone: settings.phone,
            },
            guard: IdempotencyGuard::new(dependencies.idempotency),
            summaries: SummaryIngestor::new(dependencies.summaries, call_state),
            metrics: dependencies.metrics,
        }
    }

    pub async fn handle_tool_call(&self, invocation: &ToolInvocation) -> String {
        self.answer(invocation, Replay::Guarded).await
    }

    /// Runs a tool outside any conversation and without replay protection.
    pub async fn run_tool(&self, tool_name: &str, arguments: &Map<String, Value>) -> String {
        let invocation = ToolInvocation {
            conversation_id: None,
            tool_call_id: format!("direct-{tool_name}"),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
        };
        self.answer(&invocation, Replay::Bypass).await
    }

    pub async fn ingest_summary(&self, body: &Value) -> SummaryStatus {
        self.summaries.ingest(body).await
    }

    pub async fn store_counts(&self) -> Result<StoreCounts, RepositoryError> {
        Ok(StoreCounts {
            customers: self.context.customers.count().await?,
            orders: self.context.orders.count().await?,
        })
    }

    async fn answer(&self, invocation: &ToolInvocation, replay: Replay) -> String {
        let started = Instant::now();
        let conversation_id = invocation.conversation_id.as_deref();

        let Some(tool) = ToolName::parse(&invocation.tool_name) else {
            warn!(
                event_name = "gateway.tool.unknown",
                tool_call_id = %invocation.tool_call_id,
                tool_name = %invocation.tool_name,
                conversation_id = conversation_id.unwrap_or_default(),
                "unknown tool requested"
            );
            self.metrics.record(UNKNOWN_TOOL_LABEL, ToolOutcome::UnknownTool, started.elapsed());
            return unknown_tool_reply(&invocation.tool_name);
        };

        let fingerprint = match replay {
            Replay::Guarded => Some(IdempotencyGuard::fingerprint(
                conversation_id,
                tool.as_str(),
                &invocation.arguments,
            )),
            Replay::Bypass => None,
        };

        if let Some(fingerprint) = &fingerprint {
            if let Some(cached) = self.guard.lookup(fingerprint).await {
                info!(
                    event_name = "gateway.tool.replayed",
                    tool_call_id = %invocation.tool_call_id,
                    tool_name = tool.as_str(),
                    conversation_id = conversation_id.unwrap_or_default(),
                    fingerprint = %fingerprint,
                    "returning recorded reply for repeated tool call"
                );
                self.metrics.record(tool.as_str(), ToolOutcome::Cached, started.elapsed());
                return cached;
            }
        }

        let outcome = tool.dispatch(&self.context, conversation_id, &invocation.arguments).await;
        let (reply, metric) = match outcome {
            Ok(reply) => {
                if let Some(fingerprint) = fingerprint {
                    self.guard
                        .record(
                            fingerprint,
                            tool.as_str(),
                            conversation_id,
                            &invocation.arguments,
                            &reply,
                        )
                        .await;
                }
                (reply, ToolOutcome::Success)
            }
            Err(error) => {
                log_tool_error(tool, &invocation.tool_call_id, conversation_id, &error);
                (error.user_message().to_string(), error.outcome())
            }
        };

        info!(
            event_name = "gateway.tool.completed",
            tool_call_id = %invocation.tool_call_id,
            tool_name = tool.as_str(),
            conversation_id = conversation_id.unwrap_or_default(),
            outcome = metric.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call answered"
        );
        self.metrics.record(tool.as_str(), metric, started.elapsed());
        reply
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Replay {
    /// Webhook deliveries: identical (conversation, tool, arguments) triples
    /// get the recorded reply.
    Guarded,
    Bypass,
}

fn log_tool_error(
    tool: ToolName,
    tool_call_id: &str,
    conversation_id: Option<&str>,
    failure: &ToolError,
) {
    let conversation_id = conversation_id.unwrap_or_default();
    match failure {
        ToolError::Validation(prompt) => debug!(
            event_name = "gateway.tool.validation",
            tool_call_id,
            tool_name = tool.as_str(),
            conversation_id,
            prompt = %prompt,
            "tool arguments rejected"
        ),
        ToolError::NotFound(prompt) => info!(
            event_name = "gateway.tool.not_found",
            tool_call_id,
            tool_name = tool.as_str(),
            conversation_id,
            prompt = %prompt,
            "tool target not found"
        ),
        ToolError::Store(detail) => error!(
            event_name = "gateway.tool.store_error",
            tool_call_id,
            tool_name = tool.as_str(),
            conversation_id,
            error = %detail,
            "store failure while handling tool call"
        ),
        ToolError::Unexpected(detail) => error!(
            event_name = "gateway.tool.unexpected_error",
            tool_call_id,
            tool_name = tool.as_str(),
            conversation_id,
            error = %detail,
            backtrace = %Backtrace::force_capture(),
            "unexpected failure while handling tool call"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use protogas_core::domain::invocation::ToolInvocation;
    use protogas_core::errors::STORE_UNAVAILABLE_MESSAGE;
    use protogas_core::metrics::{InMemoryToolMetrics, ToolOutcome};
    use protogas_db::repositories::{
        InMemoryCallStateCache, InMemoryCallSummaryRepository, InMemoryCustomerRepository,
        InMemoryIdempotencyRepository, InMemoryOrderRepository,
    };

    use super::{GatewayDependencies, GatewayRuntime, GatewaySettings, StoreCounts};
    use crate::handlers::order_status::MISSING_PHONE_PROMPT;

    struct Harness {
        runtime: GatewayRuntime,
        customers: Arc<InMemoryCustomerRepository>,
        orders: Arc<InMemoryOrderRepository>,
        idempotency: Arc<InMemoryIdempotencyRepository>,
        metrics: InMemoryToolMetrics,
    }

    fn harness() -> Harness {
        let customers = Arc::new(InMemoryCustomerRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let idempotency = Arc::new(InMemoryIdempotencyRepository::default());
        let metrics = InMemoryToolMetrics::default();
        let runtime = GatewayRuntime::new(
            GatewayDependencies {
                customers: customers.clone(),
                orders: orders.clone(),
                idempotency: idempotency.clone(),
                call_state: Arc::new(InMemoryCallStateCache::default()),
                summaries: Arc::new(InMemoryCallSummaryRepository::default()),
                metrics: Arc::new(metrics.clone()),
            },
            GatewaySettings::default(),
        );
        Harness { runtime, customers, orders, idempotency, metrics }
    }

    fn call(conversation_id: Option<&str>, tool_name: &str, arguments: Value) -> ToolInvocation {
        let arguments = match arguments {
            Value::Object(map) => map,
            other => panic!("expected object arguments, got {other}"),
        };
        ToolInvocation {
            conversation_id: conversation_id.map(str::to_string),
            tool_call_id: "tc-1".to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        }
    }

    fn asha() -> Value {
        json!({"name": "Asha", "phone": "0712345678", "address": "Kilimani"})
    }

    #[tokio::test]
    async fn create_order_status_scenario() {
        let harness = harness();
        let conv = Some("conv-1");

        let created = harness.runtime.handle_tool_call(&call(conv, "create_customer", asha())).await;
        assert!(created.contains("account has been created successfully, Asha"));

        let placed = harness
            .runtime
            .handle_tool_call(&call(conv, "place_order", json!({"cylinder_size": "6kg", "quantity": 2})))
            .await;
        assert!(placed.contains("2 × 6kg"));
        assert!(placed.contains("KES 2,400"));
        assert!(placed.contains("tomorrow"));

        let status = harness.runtime.handle_tool_call(&call(conv, "get_order_status", json!({}))).await;
        let orders = harness.orders.all().await;
        assert_eq!(orders.len(), 1);
        assert!(status.contains(&orders[0].id.spoken()));
        assert!(status.contains("2 × 6kg"));
        assert!(status.contains("KES 2,400"));
        assert!(status.contains("is being processed"));
        assert!(status.contains("soon"));

        assert_eq!(harness.metrics.count("create_customer", ToolOutcome::Success), 1);
        assert_eq!(harness.metrics.count("place_order", ToolOutcome::Success), 1);
        assert_eq!(harness.metrics.count("get_order_status", ToolOutcome::Success), 1);
    }

    #[tokio::test]
    async fn replayed_call_returns_identical_reply_without_executing() {
        let harness = harness();
        let conv = Some("conv-1");
        harness.runtime.handle_tool_call(&call(conv, "create_customer", asha())).await;
        let upserts = harness.customers.upsert_count();

        let order = call(conv, "place_order", json!({"cylinder_size": "13kg", "quantity": 1}));
        let first = harness.runtime.handle_tool_call(&order).await;
        let second = harness.runtime.handle_tool_call(&order).await;

        assert_eq!(first, second);
        assert_eq!(harness.orders.all().await.len(), 1);
        assert_eq!(harness.metrics.count("place_order", ToolOutcome::Cached), 1);

        let again = harness.runtime.handle_tool_call(&call(conv, "create_customer", asha())).await;
        assert!(again.contains("created successfully"));
        assert_eq!(harness.customers.upsert_count(), upserts);
    }

    #[tokio::test]
    async fn retry_without_conversation_inserts_one_order() {
        let harness = harness();
        harness.runtime.handle_tool_call(&call(None, "create_customer", asha())).await;

        let order = call(
            None,
            "place_order",
            json!({"phone": "0712345678", "cylinder_size": "6kg", "quantity": 1}),
        );
        let first = harness.runtime.handle_tool_call(&order).await;
        let second = harness.runtime.handle_tool_call(&order).await;

        assert!(first.contains("Your order has been placed"));
        assert_eq!(first, second);
        assert_eq!(harness.orders.all().await.len(), 1);
        assert_eq!(harness.metrics.count("place_order", ToolOutcome::Cached), 1);
    }

    #[tokio::test]
    async fn replayed_status_is_served_from_ledger() {
        let harness = harness();
        harness.runtime.handle_tool_call(&call(None, "create_customer", asha())).await;
        harness
            .runtime
            .handle_tool_call(&call(
                None,
                "place_order",
                json!({"phone": "0712345678", "cylinder_size": "13kg", "quantity": 1}),
            ))
            .await;

        let status = call(Some("conv-1"), "get_order_status", json!({"phone": "0712345678"}));
        let first = harness.runtime.handle_tool_call(&status).await;
        let lookups = harness.customers.lookup_count();
        let second = harness.runtime.handle_tool_call(&status).await;

        assert!(first.contains("is being processed"));
        assert_eq!(first, second);
        assert_eq!(harness.customers.lookup_count(), lookups);
        assert_eq!(harness.metrics.count("get_order_status", ToolOutcome::Success), 1);
        assert_eq!(harness.metrics.count("get_order_status", ToolOutcome::Cached), 1);
    }

    #[tokio::test]
    async fn failures_are_not_recorded() {
        let harness = harness();
        let conv = Some("conv-1");

        let zero = call(conv, "place_order", json!({"cylinder_size": "6kg", "quantity": 0}));
        harness.runtime.handle_tool_call(&zero).await;
        harness.runtime.handle_tool_call(&zero).await;
        harness.runtime.handle_tool_call(&call(None, "get_order_status", json!({}))).await;

        assert_eq!(harness.idempotency.len().await, 0);
        assert_eq!(harness.metrics.count("place_order", ToolOutcome::Validation), 2);
        assert_eq!(harness.metrics.count("place_order", ToolOutcome::Cached), 0);
        assert_eq!(harness.metrics.count("get_order_status", ToolOutcome::Validation), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_answered_in_text() {
        let harness = harness();

        let reply = harness.runtime.handle_tool_call(&call(Some("conv-1"), "foo", json!({}))).await;

        assert_eq!(reply, "Unknown tool: foo");
        assert_eq!(harness.metrics.count("unknown", ToolOutcome::UnknownTool), 1);
    }

    #[tokio::test]
    async fn store_outage_is_spoken_generically() {
        let harness = harness();
        harness.customers.set_unavailable(true);

        let reply = harness.runtime.handle_tool_call(&call(Some("conv-1"), "create_customer", asha())).await;

        assert_eq!(reply, STORE_UNAVAILABLE_MESSAGE);
        assert_eq!(harness.metrics.count("create_customer", ToolOutcome::StoreError), 1);
        assert_eq!(harness.idempotency.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remembered_phone_expires_with_call_state() {
        let harness = harness();
        let conv = Some("conv-1");
        harness.runtime.handle_tool_call(&call(conv, "create_customer", asha())).await;

        let remembered = harness
            .runtime
            .handle_tool_call(&call(conv, "place_order", json!({"cylinder_size": "6kg", "quantity": 1})))
            .await;
        assert!(remembered.contains("Your order has been placed"));

        tokio::time::advance(Duration::from_secs(601)).await;

        let expired = harness.runtime.handle_tool_call(&call(conv, "get_order_status", json!({}))).await;
        assert_eq!(expired, MISSING_PHONE_PROMPT);
    }

    #[tokio::test]
    async fn store_counts_follow_writes_and_outages() {
        let harness = harness();
        harness.runtime.handle_tool_call(&call(None, "create_customer", asha())).await;
        harness
            .runtime
            .handle_tool_call(&call(
                None,
                "place_order",
                json!({"phone": "0712345678", "cylinder_size": "6kg", "quantity": 3}),
            ))
            .await;

        let counts = harness.runtime.store_counts().await.expect("counts");
        assert_eq!(counts, StoreCounts { customers: 1, orders: 1 });

        harness.orders.set_unavailable(true);
        assert!(harness.runtime.store_counts().await.is_err());
    }

    #[tokio::test]
    async fn direct_runs_skip_the_ledger() {
        let harness = harness();
        let arguments = match asha() {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let first = harness.runtime.run_tool("create_customer", &arguments).await;
        let second = harness.runtime.run_tool("create_customer", &arguments).await;

        assert!(first.contains("created successfully"));
        assert!(second.starts_with("Welcome back"));
        assert_eq!(harness.idempotency.insert_count(), 0);
    }
}
