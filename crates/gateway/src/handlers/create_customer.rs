use serde_json::{Map, Value};
use tracing::info;

use protogas_core::domain::call_state::CallState;
use protogas_core::domain::customer::CustomerUpsert;
use protogas_core::errors::ToolError;

use super::{text_argument, ToolContext};

pub const MISSING_NAME_PROMPT: &str =
    "I need your full name to create the account. What name should I put on it?";
pub const MISSING_PHONE_PROMPT: &str =
    "I need a phone number to create your account. What number can we reach you on?";
pub const MISSING_ADDRESS_PROMPT: &str =
    "I need a delivery address for your account. Where should we deliver your cylinders?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub email: Option<String>,
}

impl CreateCustomerRequest {
    pub fn parse(arguments: &Map<String, Value>) -> Result<Self, ToolError> {
        let name = text_argument(arguments, "name")
            .ok_or_else(|| ToolError::validation(MISSING_NAME_PROMPT))?;
        let phone = text_argument(arguments, "phone")
            .ok_or_else(|| ToolError::validation(MISSING_PHONE_PROMPT))?;
        let address = text_argument(arguments, "address")
            .ok_or_else(|| ToolError::validation(MISSING_ADDRESS_PROMPT))?;

        Ok(Self { name, phone, address, email: text_argument(arguments, "email") })
    }
}

pub async fn create_customer(
    context: &ToolContext,
    conversation_id: Option<&str>,
    arguments: &Map<String, Value>,
) -> Result<String, ToolError> {
    let request = CreateCustomerRequest::parse(arguments)?;
    let phone = context.normalize_phone(&request.phone);

    let customer = context
        .customers
        .upsert(CustomerUpsert {
            name: request.name,
            phone,
            address: request.address,
            email: request.email,
        })
        .await?;
    let created = customer.was_just_created();

    info!(
        event_name = "gateway.customer.upserted",
        customer_id = %customer.id,
        created,
        conversation_id = conversation_id.unwrap_or_default(),
        "customer account saved"
    );

    context
        .call_state
        .update(
            conversation_id,
            CallState {
                customer_id: Some(customer.id),
                customer_phone: Some(customer.phone.clone()),
                customer_name: Some(customer.name.clone()),
                ..CallState::default()
            },
        )
        .await;

    if created {
        Ok(format!(
            "Perfect! Your account has been created successfully, {}. You can now place orders for LPG cylinders.",
            customer.name
        ))
    } else {
        Ok(format!(
            "Welcome back, {}! I found your existing account and updated your details. You're all set to place orders.",
            customer.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use protogas_core::errors::ToolError;
    use protogas_db::repositories::CustomerRepository;

    use super::{create_customer, MISSING_ADDRESS_PROMPT, MISSING_NAME_PROMPT};
    use crate::handlers::testing::{args, fixture};

    #[tokio::test]
    async fn blank_name_prompts_without_touching_the_store() {
        let fixture = fixture();

        let result = create_customer(
            &fixture.context,
            Some("conv-1"),
            &args(json!({"name": "", "phone": "+254700000000", "address": "X"})),
        )
        .await;

        assert_eq!(result, Err(ToolError::validation(MISSING_NAME_PROMPT)));
        assert_eq!(fixture.customers.upsert_count(), 0);
    }

    #[tokio::test]
    async fn missing_address_gets_its_own_prompt() {
        let fixture = fixture();

        let result = create_customer(
            &fixture.context,
            None,
            &args(json!({"name": "Asha", "phone": "0712345678"})),
        )
        .await;

        assert_eq!(result, Err(ToolError::validation(MISSING_ADDRESS_PROMPT)));
    }

    #[tokio::test]
    async fn new_then_returning_customer() {
        let fixture = fixture();
        let arguments =
            args(json!({"name": "Asha", "phone": "0712 345 678", "address": "Kilimani"}));

        let first = create_customer(&fixture.context, Some("conv-1"), &arguments)
            .await
            .expect("create");
        assert!(first.contains("account has been created successfully, Asha"));

        let second = create_customer(&fixture.context, Some("conv-2"), &arguments)
            .await
            .expect("welcome back");
        assert!(second.starts_with("Welcome back, Asha!"));

        let stored = fixture
            .customers
            .find_by_phone("+254712345678")
            .await
            .expect("lookup")
            .expect("normalized phone stored");
        assert_eq!(stored.address, "Kilimani");
    }

    #[tokio::test]
    async fn unparseable_phone_is_stored_raw_and_remembered() {
        let fixture = fixture();

        create_customer(
            &fixture.context,
            Some("conv-1"),
            &args(json!({"name": "Ben", "phone": " ext-22 ", "address": "Westlands"})),
        )
        .await
        .expect("create");

        let state = fixture.context.call_state.get(Some("conv-1")).await;
        assert_eq!(state.customer_phone.as_deref(), Some("ext-22"));
        assert_eq!(state.customer_name.as_deref(), Some("Ben"));
        assert!(state.customer_id.is_some());
    }

    #[tokio::test]
    async fn store_outage_is_a_store_error() {
        let fixture = fixture();
        fixture.customers.set_unavailable(true);

        let result = create_customer(
            &fixture.context,
            None,
            &args(json!({"name": "Asha", "phone": "0712345678", "address": "Kilimani"})),
        )
        .await;

        assert!(matches!(result, Err(ToolError::Store(_))));
    }
}
