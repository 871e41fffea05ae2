use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use protogas_core::metrics::{ToolMetrics, ToolOutcome};

use crate::routes::AppState;

/// Prometheus sink for tool-call outcomes, on a registry owned by the server.
#[derive(Clone)]
pub struct PrometheusToolMetrics {
    registry: Registry,
    calls: IntCounterVec,
    duration: HistogramVec,
}

impl PrometheusToolMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let calls = IntCounterVec::new(
            Opts::new("protogas_tool_calls_total", "Tool calls answered, by tool and outcome"),
            &["tool", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "protogas_tool_call_duration_seconds",
                "Time spent answering a tool call",
            ),
            &["tool"],
        )?;
        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self { registry, calls, duration })
    }

    pub fn encode(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let body = String::from_utf8(buffer)
            .map_err(|error| prometheus::Error::Msg(format!("metrics are not utf-8: {error}")))?;
        Ok((encoder.format_type().to_string(), body))
    }
}

impl ToolMetrics for PrometheusToolMetrics {
    fn record(&self, tool_name: &str, outcome: ToolOutcome, elapsed: Duration) {
        self.calls.with_label_values(&[tool_name, outcome.as_str()]).inc();
        self.duration.with_label_values(&[tool_name]).observe(elapsed.as_secs_f64());
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok((content_type, body)) => match HeaderValue::from_str(&content_type) {
            Ok(content_type) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
            Err(err) => {
                error!(
                    event_name = "system.metrics.encode_failed",
                    error = %err,
                    "failed to build content-type header for metrics"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
            }
        },
        Err(err) => {
            error!(
                event_name = "system.metrics.encode_failed",
                error = %err,
                "failed to encode prometheus metrics"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
