use serde_json::{Map, Value};
use tracing::debug;

use protogas_core::domain::call_state::CallState;
use protogas_core::errors::ToolError;

use super::{text_argument, ToolContext};

pub const MISSING_PHONE_PROMPT: &str =
    "I need your phone number to look up your order. What's the number on your account?";
pub const NO_ACCOUNT_PROMPT: &str =
    "I couldn't find an account with that phone number. Would you like to create an account?";
pub const NO_ORDERS_PROMPT: &str = "You have no orders yet. Would you like to place one?";
pub const DEFAULT_DELIVERY: &str = "soon";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderStatusRequest {
    pub phone: Option<String>,
}

impl OrderStatusRequest {
    pub fn parse(arguments: &Map<String, Value>) -> Self {
        Self { phone: text_argument(arguments, "phone") }
    }
}

pub async fn get_order_status(
    context: &ToolContext,
    conversation_id: Option<&str>,
    arguments: &Map<String, Value>,
) -> Result<String, ToolError> {
    let request = OrderStatusRequest::parse(arguments);
    let phone = match request.phone {
        Some(phone) => context.normalize_phone(&phone),
        None => context
            .call_state
            .get(conversation_id)
            .await
            .customer_phone
            .ok_or_else(|| ToolError::validation(MISSING_PHONE_PROMPT))?,
    };

    let customer = context
        .customers
        .find_by_phone(&phone)
        .await?
        .ok_or_else(|| ToolError::not_found(NO_ACCOUNT_PROMPT))?;

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

    let order = context
        .orders
        .find_latest_for_customer(&customer.id)
        .await?
        .ok_or_else(|| ToolError::not_found(NO_ORDERS_PROMPT))?;

    debug!(
        event_name = "gateway.order.status_read",
        order_id = %order.id,
        status = order.status.as_str(),
        "latest order status read"
    );

    Ok(format!(
        "Your most recent order, number {}, for {} × {} totalling {} {}. Expected delivery: {}.",
        order.id.spoken(),
        order.quantity,
        order.cylinder_size,
        context.prices.format_amount(order.total_amount),
        order.status.spoken_phrase(),
        order.delivery_date.as_deref().unwrap_or(DEFAULT_DELIVERY),
    ))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use protogas_core::domain::customer::CustomerUpsert;
    use protogas_core::domain::order::{CylinderSize, NewOrder, OrderStatus};
    use protogas_core::errors::ToolError;
    use protogas_db::repositories::{CustomerRepository, OrderRepository};

    use super::{get_order_status, MISSING_PHONE_PROMPT, NO_ACCOUNT_PROMPT, NO_ORDERS_PROMPT};
    use crate::handlers::testing::{args, fixture};

    #[tokio::test]
    async fn prompts_cover_missing_phone_account_and_orders() {
        let fixture = fixture();

        assert_eq!(
            get_order_status(&fixture.context, Some("conv-1"), &args(json!({}))).await,
            Err(ToolError::validation(MISSING_PHONE_PROMPT))
        );
        assert_eq!(
            get_order_status(&fixture.context, None, &args(json!({"phone": "0712345678"}))).await,
            Err(ToolError::not_found(NO_ACCOUNT_PROMPT))
        );

        fixture
            .customers
            .upsert(CustomerUpsert {
                name: "Asha".to_string(),
                phone: "+254712345678".to_string(),
                address: "Kilimani".to_string(),
                email: None,
            })
            .await
            .expect("seed customer");
        assert_eq!(
            get_order_status(&fixture.context, None, &args(json!({"phone": "0712345678"}))).await,
            Err(ToolError::not_found(NO_ORDERS_PROMPT))
        );
    }

    #[tokio::test]
    async fn renders_latest_order_with_delivery_date() {
        let fixture = fixture();
        let customer = fixture
            .customers
            .upsert(CustomerUpsert {
                name: "Asha".to_string(),
                phone: "+254712345678".to_string(),
                address: "Kilimani".to_string(),
                email: None,
            })
            .await
            .expect("seed customer");
        let order = fixture
            .orders
            .insert(NewOrder {
                customer_id: customer.id,
                cylinder_size: CylinderSize::Kg13,
                quantity: 1,
                unit_price: Decimal::new(2800, 0),
                delivery_date: Some("Friday".to_string()),
                notes: None,
            })
            .await
            .expect("seed order");

        let reply = get_order_status(&fixture.context, None, &args(json!({"phone": "0712345678"})))
            .await
            .expect("status");

        assert_eq!(
            reply,
            format!(
                "Your most recent order, number {}, for 1 × 13kg totalling KES 2,800 is being processed. Expected delivery: Friday.",
                order.id.spoken()
            )
        );
    }

    #[tokio::test]
    async fn every_stored_status_has_a_spoken_phrase() {
        let cases = [
            (OrderStatus::Pending, "is being processed"),
            (OrderStatus::Confirmed, "has been confirmed"),
            (OrderStatus::OutForDelivery, "is out for delivery"),
            (OrderStatus::Delivered, "has been delivered"),
            (OrderStatus::Cancelled, "has been cancelled"),
            (OrderStatus::Unrecognized("returned".to_string()), "is in progress"),
        ];

        let fixture = fixture();
        let customer = fixture
            .customers
            .upsert(CustomerUpsert {
                name: "Asha".to_string(),
                phone: "+254712345678".to_string(),
                address: "Kilimani".to_string(),
                email: None,
            })
            .await
            .expect("seed customer");
        let order = fixture
            .orders
            .insert(NewOrder {
                customer_id: customer.id,
                cylinder_size: CylinderSize::Kg6,
                quantity: 2,
                unit_price: Decimal::new(1200, 0),
                delivery_date: None,
                notes: None,
            })
            .await
            .expect("seed order");

        for (status, phrase) in cases {
            assert!(fixture.orders.set_status(&order.id, status.clone()).await);

            let reply =
                get_order_status(&fixture.context, None, &args(json!({"phone": "0712345678"})))
                    .await
                    .expect("status");

            assert!(
                reply.ends_with(&format!("totalling KES 2,400 {phrase}. Expected delivery: soon.")),
                "{status:?} rendered as {reply}"
            );
        }
    }
}
