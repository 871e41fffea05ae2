use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;

/// Number of order-id characters read back to the caller.
pub const SPOKEN_ORDER_ID_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Leading characters of the id, short enough to read out over the phone.
    pub fn spoken(&self) -> String {
        self.0.to_string().chars().take(SPOKEN_ORDER_ID_LEN).collect()
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CylinderSize {
    #[serde(rename = "6kg")]
    Kg6,
    #[serde(rename = "13kg")]
    Kg13,
}

impl CylinderSize {
    pub const ALL: [CylinderSize; 2] = [Self::Kg6, Self::Kg13];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kg6 => "6kg",
            Self::Kg13 => "13kg",
        }
    }

    /// Case-insensitive, whitespace-tolerant match (`"13 KG"` is `13kg`).
    pub fn parse(value: &str) -> Option<Self> {
        let compact: String =
            value.chars().filter(|ch| !ch.is_whitespace()).collect::<String>().to_ascii_lowercase();
        match compact.as_str() {
            "6kg" => Some(Self::Kg6),
            "13kg" => Some(Self::Kg13),
            _ => None,
        }
    }

    /// `"6kg or 13kg"`, for prompts that list the valid choices.
    pub fn choices() -> String {
        Self::ALL.iter().map(CylinderSize::as_str).collect::<Vec<_>>().join(" or ")
    }
}

impl fmt::Display for CylinderSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    OutForDelivery,
    Delivered,
    Cancelled,
    /// A stored status outside the known set, kept verbatim.
    #[serde(untagged)]
    Unrecognized(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            _ => Self::Unrecognized(value.trim().to_string()),
        }
    }

    pub fn spoken_phrase(&self) -> &'static str {
        match self {
            Self::Pending => "is being processed",
            Self::Confirmed => "has been confirmed",
            Self::OutForDelivery => "is out for delivery",
            Self::Delivered => "has been delivered",
            Self::Cancelled => "has been cancelled",
            Self::Unrecognized(_) => "is in progress",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub cylinder_size: CylinderSize,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub cylinder_size: CylinderSize,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    /// `None` when unit price times quantity does not fit in a `Decimal`.
    pub fn checked_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    /// Materializes the order row the store persists: fresh id, `pending`.
    /// An overflowing total saturates; callers reject it via `checked_total`.
    pub fn into_order(self, created_at: DateTime<Utc>) -> Order {
        let total_amount = self.unit_price.saturating_mul(Decimal::from(self.quantity));
        Order {
            id: OrderId::new(),
            customer_id: self.customer_id,
            cylinder_size: self.cylinder_size,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_amount,
            delivery_date: self.delivery_date,
            notes: self.notes,
            status: OrderStatus::Pending,
            created_at,
        }
    }
}
