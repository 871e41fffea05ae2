//! Inbound webhook envelope normalization.
//!
//! The voice platform has sent tool calls in two layouts over time:
//!
//! - `message.toolCallList[]` entries shaped `{id, name, arguments}`
//! - `message.toolCalls[]` entries shaped `{id, function: {name, arguments}}`
//!
//! Both collapse into one [`ToolInvocation`]. Only the first call in a list is
//! honoured.

use serde_json::{Map, Value};

use protogas_core::domain::invocation::ToolInvocation;
use protogas_core::errors::EnvelopeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeShape {
    ToolCallList,
    ToolCalls,
}

impl EnvelopeShape {
    const ALL: [EnvelopeShape; 2] = [Self::ToolCallList, Self::ToolCalls];

    pub fn field(&self) -> &'static str {
        match self {
            Self::ToolCallList => "toolCallList",
            Self::ToolCalls => "toolCalls",
        }
    }
}

pub fn parse_envelope(body: &[u8]) -> Result<ToolInvocation, EnvelopeError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|error| EnvelopeError::InvalidJson(error.to_string()))?;
    parse_envelope_value(&value)
}

pub fn parse_envelope_value(body: &Value) -> Result<ToolInvocation, EnvelopeError> {
    let message = body.get("message").unwrap_or(&Value::Null);

    // An empty list in one layout falls through to the other.
    let call = EnvelopeShape::ALL
        .iter()
        .filter_map(|shape| message.get(shape.field()).and_then(Value::as_array))
        .find_map(|calls| calls.first())
        .ok_or(EnvelopeError::MissingToolCalls)?;

    let tool_call_id = match call.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(EnvelopeError::MissingToolCallId),
    };

    let function = call.get("function");
    let tool_name = call
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| function.and_then(|function| function.get("name")).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();
    let arguments = call
        .get("arguments")
        .or_else(|| function.and_then(|function| function.get("arguments")))
        .map(decode_arguments)
        .unwrap_or_default();

    Ok(ToolInvocation {
        conversation_id: conversation_id(body),
        tool_call_id,
        tool_name,
        arguments,
    })
}

/// Conversation id from `message.callId`, `message.call.id`, or `callId`.
pub fn conversation_id(body: &Value) -> Option<String> {
    let message = body.get("message");
    let candidates = [
        message.and_then(|message| message.get("callId")),
        message.and_then(|message| message.get("call")).and_then(|call| call.get("id")),
        body.get("callId"),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// Arguments arrive as an object or as a JSON-encoded string of one. Anything
/// else decodes to no arguments.
fn decode_arguments(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}
