use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::order::OrderId;

/// Idle window after which a conversation's session facts are forgotten.
pub const CALL_STATE_TTL_SECS: u64 = 600;

/// Session facts remembered between turns of one call.
///
/// Advisory only: handlers use it to fill in identifying fields the caller
/// did not repeat, never as the record of truth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_order_total: Option<Decimal>,
}

impl CallState {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Fields set in `partial` win; unset fields keep their current value.
    pub fn merge(self, partial: CallState) -> CallState {
        CallState {
            customer_id: partial.customer_id.or(self.customer_id),
            customer_phone: partial.customer_phone.or(self.customer_phone),
            customer_name: partial.customer_name.or(self.customer_name),
            last_order_id: partial.last_order_id.or(self.last_order_id),
            last_order_total: partial.last_order_total.or(self.last_order_total),
        }
    }
}
