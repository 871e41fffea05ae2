use std::fmt;

use serde_json::{Map, Value};

use protogas_core::errors::ToolError;

use crate::handlers::{create_customer, get_order_status, place_order, ToolContext};

/// Tools the gateway answers. Wire names are matched exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolName {
    CreateCustomer,
    PlaceOrder,
    GetOrderStatus,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [Self::CreateCustomer, Self::PlaceOrder, Self::GetOrderStatus];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCustomer => "create_customer",
            Self::PlaceOrder => "place_order",
            Self::GetOrderStatus => "get_order_status",
        }
    }

    pub async fn dispatch(
        &self,
        context: &ToolContext,
        conversation_id: Option<&str>,
        arguments: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        match self {
            Self::CreateCustomer => create_customer(context, conversation_id, arguments).await,
            Self::PlaceOrder => place_order(context, conversation_id, arguments).await,
            Self::GetOrderStatus => get_order_status(context, conversation_id, arguments).await,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn unknown_tool_reply(tool_name: &str) -> String {
    format!("Unknown tool: {tool_name}")
}
