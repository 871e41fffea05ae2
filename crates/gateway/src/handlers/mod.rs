//! Domain operations behind the three voice tools.
//!
//! Each handler parses its arguments into a typed request, resolves the
//! caller's phone and customer, runs the operation, and answers with one
//! sentence. Failures are `ToolError`s; the router turns them into speech.

use std::sync::Arc;

use serde_json::{Map, Value};

use protogas_core::phone::PhoneNormalizer;
use protogas_core::pricing::PriceList;
use protogas_db::repositories::{CustomerRepository, OrderRepository};

use crate::call_state::CallStateStore;

pub mod create_customer;
pub mod order_status;
pub mod place_order;

pub use create_customer::{create_customer, CreateCustomerRequest};
pub use order_status::{get_order_status, OrderStatusRequest};
pub use place_order::{place_order, PlaceOrderRequest};

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct ToolContext {
    pub customers: Arc<dyn CustomerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub call_state: CallStateStore,
    pub prices: PriceList,
    pub phone: PhoneNormalizer,
}

impl ToolContext {
    pub fn normalize_phone(&self, raw: &str) -> String {
        self.phone.normalize_or_raw(raw)
    }
}

/// Trimmed, non-empty text for `key`. Numbers are accepted as text since
/// speech-to-text often hands phone numbers over as integers.
pub(crate) fn text_argument(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match arguments.get(key)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::args;
    use super::text_argument;

    #[test]
    fn text_arguments_are_trimmed_and_numbers_accepted() {
        let arguments = args(json!({"name": "  Asha ", "phone": 712345678, "blank": "  "}));

        assert_eq!(text_argument(&arguments, "name").as_deref(), Some("Asha"));
        assert_eq!(text_argument(&arguments, "phone").as_deref(), Some("712345678"));
        assert_eq!(text_argument(&arguments, "blank"), None);
        assert_eq!(text_argument(&arguments, "missing"), None);
    }
}
