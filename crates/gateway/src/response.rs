use serde::{Deserialize, Serialize};

/// `{"results":[{"toolCallId": ..., "result": ...}]}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReply {
    pub results: Vec<ToolCallResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    pub result: String,
}

impl ToolReply {
    pub fn single(tool_call_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            results: vec![ToolCallResult {
                tool_call_id: tool_call_id.into(),
                result: result.into(),
            }],
        }
    }
}

/// Bare error body, used only when no `toolCallId` is available.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
