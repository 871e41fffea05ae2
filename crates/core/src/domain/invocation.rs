use serde_json::{Map, Value};

/// One tool call, normalized from whichever envelope shape delivered it.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub conversation_id: Option<String>,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }
}
