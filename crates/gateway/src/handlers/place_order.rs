use serde_json::{Map, Value};
use tracing::info;

use protogas_core::domain::call_state::CallState;
use protogas_core::domain::customer::CustomerId;
use protogas_core::domain::order::{CylinderSize, NewOrder};
use protogas_core::errors::ToolError;

use super::{text_argument, ToolContext};

pub const MISSING_PHONE_PROMPT: &str =
    "I need the phone number on your account to place the order. What's your phone number?";
pub const NO_ACCOUNT_PROMPT: &str =
    "I couldn't find an account with that phone number. Would you like me to create an account for you first?";
pub const MISSING_QUANTITY_PROMPT: &str = "How many cylinders would you like to order?";
pub const INVALID_QUANTITY_PROMPT: &str =
    "Please tell me the quantity as a valid number, like 1 or 2.";
pub const NON_POSITIVE_QUANTITY_PROMPT: &str =
    "The quantity must be greater than zero. How many cylinders would you like?";
pub const DEFAULT_DELIVERY: &str = "tomorrow";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub phone: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub cylinder_size: CylinderSize,
    pub quantity: u32,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
}

impl PlaceOrderRequest {
    pub fn parse(arguments: &Map<String, Value>, max_quantity: u32) -> Result<Self, ToolError> {
        let cylinder_size = parse_cylinder_size(text_argument(arguments, "cylinder_size"))?;
        let quantity = parse_quantity(arguments.get("quantity"), max_quantity)?;

        Ok(Self {
            phone: text_argument(arguments, "phone"),
            customer_id: text_argument(arguments, "customer_id")
                .and_then(|id| CustomerId::parse(&id)),
            cylinder_size,
            quantity,
            delivery_date: text_argument(arguments, "delivery_date"),
            notes: text_argument(arguments, "notes"),
        })
    }
}

fn parse_cylinder_size(raw: Option<String>) -> Result<CylinderSize, ToolError> {
    let Some(raw) = raw else {
        return Err(ToolError::validation(format!(
            "Which cylinder size would you like, {}?",
            CylinderSize::choices()
        )));
    };

    CylinderSize::parse(&raw).ok_or_else(|| {
        ToolError::validation(format!(
            "Sorry, we only deliver {} cylinders. Which size would you like?",
            CylinderSize::choices()
        ))
    })
}

fn parse_quantity(raw: Option<&Value>, max_quantity: u32) -> Result<u32, ToolError> {
    let quantity = match raw {
        None | Some(Value::Null) => return Err(ToolError::validation(MISSING_QUANTITY_PROMPT)),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|value| value.fract() == 0.0).map(|v| v as i64)),
        Some(Value::String(text)) if text.trim().is_empty() => {
            return Err(ToolError::validation(MISSING_QUANTITY_PROMPT))
        }
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ToolError::validation(INVALID_QUANTITY_PROMPT))?;

    if quantity <= 0 {
        return Err(ToolError::validation(NON_POSITIVE_QUANTITY_PROMPT));
    }
    if quantity > i64::from(max_quantity) {
        return Err(ToolError::validation(format!(
            "For orders of more than {max_quantity} cylinders, please contact our sales team directly and they'll arrange a bulk delivery."
        )));
    }

    u32::try_from(quantity).map_err(|_| ToolError::validation(INVALID_QUANTITY_PROMPT))
}

pub async fn place_order(
    context: &ToolContext,
    conversation_id: Option<&str>,
    arguments: &Map<String, Value>,
) -> Result<String, ToolError> {
    let request = PlaceOrderRequest::parse(arguments, context.prices.max_quantity)?;
    let state = context.call_state.get(conversation_id).await;

    let phone = resolve_phone(context, &request, &state)
        .await?
        .ok_or_else(|| ToolError::validation(MISSING_PHONE_PROMPT))?;
    let customer = context
        .customers
        .find_by_phone(&phone)
        .await?
        .ok_or_else(|| ToolError::not_found(NO_ACCOUNT_PROMPT))?;

    let new_order = NewOrder {
        customer_id: customer.id,
        cylinder_size: request.cylinder_size,
        quantity: request.quantity,
        unit_price: context.prices.unit_price(request.cylinder_size),
        delivery_date: request.delivery_date,
        notes: request.notes,
    };
    if new_order.checked_total().is_none() {
        return Err(ToolError::Unexpected(format!(
            "order total overflows: {} × {}",
            new_order.quantity, new_order.unit_price
        )));
    }
    let order = context.orders.insert(new_order).await?;

    info!(
        event_name = "gateway.order.placed",
        order_id = %order.id,
        customer_id = %customer.id,
        cylinder_size = order.cylinder_size.as_str(),
        quantity = order.quantity,
        total_amount = %order.total_amount,
        conversation_id = conversation_id.unwrap_or_default(),
        "order placed"
    );

    context
        .call_state
        .update(
            conversation_id,
            CallState {
                customer_id: Some(customer.id),
                customer_phone: Some(customer.phone.clone()),
                customer_name: Some(customer.name.clone()),
                last_order_id: Some(order.id),
                last_order_total: Some(order.total_amount),
            },
        )
        .await;

    let noun = if order.quantity == 1 { "cylinder" } else { "cylinders" };
    Ok(format!(
        "Your order has been placed! {} × {} {noun} for a total of {}. Your order number is {}, and delivery is scheduled for {}.",
        order.quantity,
        order.cylinder_size,
        context.prices.format_amount(order.total_amount),
        order.id.spoken(),
        order.delivery_date.as_deref().unwrap_or(DEFAULT_DELIVERY),
    ))
}

/// Explicit argument, then the phone remembered for this call, then the
/// phone on file for a known customer id.
async fn resolve_phone(
    context: &ToolContext,
    request: &PlaceOrderRequest,
    state: &CallState,
) -> Result<Option<String>, ToolError> {
    if let Some(phone) = &request.phone {
        return Ok(Some(context.normalize_phone(phone)));
    }
    if let Some(phone) = &state.customer_phone {
        return Ok(Some(phone.clone()));
    }

    match request.customer_id.or(state.customer_id) {
        Some(customer_id) => {
            Ok(context.customers.find_by_id(&customer_id).await?.map(|customer| customer.phone))
        }
        None => Ok(None),
    }
}
