use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Label used for tool names the router does not know, so arbitrary names
/// never become metric labels.
pub const UNKNOWN_TOOL_LABEL: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    Cached,
    Validation,
    NotFound,
    StoreError,
    Unexpected,
    UnknownTool,
}

impl ToolOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cached => "cached",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::StoreError => "store_error",
            Self::Unexpected => "unexpected",
            Self::UnknownTool => "unknown_tool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolMetricSample {
    pub tool_name: String,
    pub outcome: ToolOutcome,
    pub elapsed: Duration,
}

pub trait ToolMetrics: Send + Sync {
    fn record(&self, tool_name: &str, outcome: ToolOutcome, elapsed: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopToolMetrics;

impl ToolMetrics for NoopToolMetrics {
    fn record(&self, _tool_name: &str, _outcome: ToolOutcome, _elapsed: Duration) {}
}

#[derive(Clone, Default)]
pub struct InMemoryToolMetrics {
    samples: Arc<Mutex<Vec<ToolMetricSample>>>,
}

impl InMemoryToolMetrics {
    pub fn samples(&self) -> Vec<ToolMetricSample> {
        match self.samples.lock() {
            Ok(samples) => samples.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, tool_name: &str, outcome: ToolOutcome) -> usize {
        self.samples()
            .iter()
            .filter(|sample| sample.tool_name == tool_name && sample.outcome == outcome)
            .count()
    }
}

impl ToolMetrics for InMemoryToolMetrics {
    fn record(&self, tool_name: &str, outcome: ToolOutcome, elapsed: Duration) {
        let sample = ToolMetricSample { tool_name: tool_name.to_string(), outcome, elapsed };
        match self.samples.lock() {
            Ok(mut samples) => samples.push(sample),
            Err(poisoned) => poisoned.into_inner().push(sample),
        }
    }
}
