use std::any::Any;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, warn};

use protogas_core::errors::UNEXPECTED_FAILURE_MESSAGE;
use protogas_db::DbPool;
use protogas_gateway::{parse_envelope, ErrorReply, GatewayRuntime, ToolReply};

use crate::health;
use crate::metrics::{self, PrometheusToolMetrics};

#[derive(Clone)]
pub struct AppState {
    pub runtime: GatewayRuntime,
    pub metrics: PrometheusToolMetrics,
}

pub fn router(state: AppState, db_pool: DbPool, enable_test_tools: bool) -> Router {
    let mut routes = Router::new()
        .route("/tools", post(tools))
        .route("/summary", post(summary))
        .route("/metrics", get(metrics::metrics));
    if enable_test_tools {
        routes = routes
            .route("/test-tools/{tool_name}", post(test_tool))
            .route("/test-db", get(test_db));
    }

    routes
        .with_state(state)
        .merge(health::router(db_pool))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Webhook entry point. Always answers in the platform's reply envelope once
/// a `toolCallId` is known, including when the tool call panics.
pub async fn tools(State(state): State<AppState>, body: Bytes) -> Response {
    let invocation = match parse_envelope(&body) {
        Ok(invocation) => invocation,
        Err(error) => {
            warn!(
                event_name = "system.tools.malformed_envelope",
                error = %error,
                "rejecting tool call without a usable envelope"
            );
            return (StatusCode::BAD_REQUEST, Json(ErrorReply::new(error.to_string())))
                .into_response();
        }
    };

    let tool_call_id = invocation.tool_call_id.clone();
    let runtime = state.runtime.clone();
    let handled = tokio::spawn(async move { runtime.handle_tool_call(&invocation).await }).await;

    match handled {
        Ok(result) => (StatusCode::OK, Json(ToolReply::single(tool_call_id, result))).into_response(),
        Err(join_error) => {
            error!(
                event_name = "system.tools.dispatch_panicked",
                tool_call_id = %tool_call_id,
                panicked = join_error.is_panic(),
                error = %join_error,
                "tool call aborted unexpectedly"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ToolReply::single(tool_call_id, UNEXPECTED_FAILURE_MESSAGE)),
            )
                .into_response()
        }
    }
}

/// End-of-call report. Always 200; storage problems are only logged.
pub async fn summary(State(state): State<AppState>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(error) => {
            warn!(
                event_name = "system.summary.invalid_json",
                error = %error,
                "end-of-call report is not valid JSON"
            );
            Value::Null
        }
    };

    let status = state.runtime.ingest_summary(&body).await;
    (StatusCode::OK, Json(json!({"status": status.as_str()}))).into_response()
}

/// Direct tool execution for manual testing. The body is the arguments object.
pub async fn test_tool(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    body: Bytes,
) -> Response {
    let arguments = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(arguments)) => arguments,
        _ => Map::new(),
    };

    let result = state.runtime.run_tool(&tool_name, &arguments).await;
    (StatusCode::OK, Json(json!({"tool": tool_name, "result": result}))).into_response()
}

/// Customer and order row counts, for checking a deployment's store by hand.
pub async fn test_db(State(state): State<AppState>) -> Response {
    match state.runtime.store_counts().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "customer_count": counts.customers,
                "order_count": counts.orders,
            })),
        )
            .into_response(),
        Err(error) => {
            warn!(
                event_name = "system.test_db.failed",
                error = %error,
                "store counts unavailable"
            );
            (StatusCode::OK, Json(json!({"status": "error", "error": error.to_string()})))
                .into_response()
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(
        event_name = "system.http.panic",
        error = detail,
        "request handler panicked"
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorReply::new("internal server error")))
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use protogas_core::domain::customer::{Customer, CustomerId, CustomerUpsert};
    use protogas_core::errors::UNEXPECTED_FAILURE_MESSAGE;
    use protogas_db::repositories::{
        CustomerRepository, InMemoryCallStateCache, InMemoryCallSummaryRepository,
        InMemoryCustomerRepository, InMemoryIdempotencyRepository, InMemoryOrderRepository,
        RepositoryError,
    };
    use protogas_db::{connect_with_settings, DbPool};
    use protogas_gateway::{GatewayDependencies, GatewayRuntime, GatewaySettings};

    use super::{router, AppState};
    use crate::metrics::PrometheusToolMetrics;

    struct PanickingCustomers;

    #[async_trait]
    impl CustomerRepository for PanickingCustomers {
        async fn find_by_phone(&self, _phone: &str) -> Result<Option<Customer>, RepositoryError> {
            panic!("customer store exploded");
        }

        async fn find_by_id(&self, _id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
            panic!("customer store exploded");
        }

        async fn upsert(&self, _customer: CustomerUpsert) -> Result<Customer, RepositoryError> {
            panic!("customer store exploded");
        }

        async fn count(&self) -> Result<u64, RepositoryError> {
            panic!("customer store exploded");
        }
    }

    async fn app_with(customers: Arc<dyn CustomerRepository>, enable_test_tools: bool) -> Router {
        let metrics = PrometheusToolMetrics::new().expect("metrics");
        let runtime = GatewayRuntime::new(
            GatewayDependencies {
                customers,
                orders: Arc::new(InMemoryOrderRepository::default()),
                idempotency: Arc::new(InMemoryIdempotencyRepository::default()),
                call_state: Arc::new(InMemoryCallStateCache::default()),
                summaries: Arc::new(InMemoryCallSummaryRepository::default()),
                metrics: Arc::new(metrics.clone()),
            },
            GatewaySettings::default(),
        );
        router(AppState { runtime, metrics }, pool().await, enable_test_tools)
    }

    async fn app() -> Router {
        app_with(Arc::new(InMemoryCustomerRepository::default()), false).await
    }

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn tool_call(tool_name: &str, arguments: Value) -> Value {
        json!({
            "message": {
                "call": {"id": "conv-1"},
                "toolCallList": [{"id": "tc-1", "name": tool_name, "arguments": arguments}]
            }
        })
    }

    #[tokio::test]
    async fn tool_reply_is_enveloped() {
        let (status, body) = post(
            app().await,
            "/tools",
            tool_call(
                "create_customer",
                json!({"name": "Asha", "phone": "0712345678", "address": "Kilimani"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["toolCallId"], "tc-1");
        assert!(body["results"][0]["result"]
            .as_str()
            .expect("result text")
            .contains("created successfully"));
    }

    #[tokio::test]
    async fn unknown_tool_is_still_a_success() {
        let (status, body) = post(app().await, "/tools", tool_call("foo", json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"results": [{"toolCallId": "tc-1", "result": "Unknown tool: foo"}]}));
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_bare_400() {
        let (status, body) = post(app().await, "/tools", json!({"message": {}})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert!(body.get("results").is_none());
    }

    #[tokio::test]
    async fn panic_after_tool_call_id_is_an_enveloped_500() {
        let app = app_with(Arc::new(PanickingCustomers), false).await;

        let (status, body) = post(
            app,
            "/tools",
            tool_call("get_order_status", json!({"phone": "0712345678"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"results": [{"toolCallId": "tc-1", "result": UNEXPECTED_FAILURE_MESSAGE}]})
        );
    }

    #[tokio::test]
    async fn summary_always_acknowledges() {
        let (status, body) = post(
            app().await,
            "/summary",
            json!({"message": {"call": {"id": "conv-1"}, "transcript": "hello"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, body) = post(app().await, "/summary", json!({"message": {}})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ignored"}));
    }

    #[tokio::test]
    async fn test_tools_route_is_opt_in() {
        let arguments = json!({"name": "Asha", "phone": "0712345678", "address": "Kilimani"});

        let disabled = app()
            .await
            .oneshot(
                Request::post("/test-tools/create_customer")
                    .body(axum::body::Body::from(arguments.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(disabled.status(), StatusCode::NOT_FOUND);

        let enabled = app_with(Arc::new(InMemoryCustomerRepository::default()), true).await;
        let (status, body) = post(enabled, "/test-tools/create_customer", arguments).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tool"], "create_customer");
        assert!(body["result"].as_str().expect("result").contains("created successfully"));
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response =
            app.oneshot(Request::get(uri).body(Body::empty()).expect("request")).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn test_db_reports_store_counts_when_enabled() {
        let disabled = app()
            .await
            .oneshot(Request::get("/test-db").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(disabled.status(), StatusCode::NOT_FOUND);

        let customers = Arc::new(InMemoryCustomerRepository::default());
        let app = app_with(customers.clone(), true).await;
        post(
            app.clone(),
            "/test-tools/create_customer",
            json!({"name": "Asha", "phone": "0712345678", "address": "Kilimani"}),
        )
        .await;

        let (status, body) = get_json(app.clone(), "/test-db").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "customer_count": 1, "order_count": 0}));

        customers.set_unavailable(true);
        let (status, body) = get_json(app, "/test-db").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn metrics_endpoint_exposes_tool_counters() {
        let app = app().await;
        post(app.clone(), "/tools", tool_call("foo", json!({}))).await;

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.contains(r#"protogas_tool_calls_total{outcome="unknown_tool",tool="unknown"} 1"#));
    }
}
