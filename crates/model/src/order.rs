use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{ContactInfo, Money, PaymentReference};

/// Order state machine.
///
/// `WAITING_PAYMENT` is the only initial state; `CANCELLED` and `DELIVERED`
/// are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    WaitingPayment,
    OnProgress,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (WaitingPayment, OnProgress)
                | (WaitingPayment, Cancelled)
                | (OnProgress, Packed)
                | (OnProgress, Cancelled)
                | (Packed, Shipped)
                | (Shipped, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Delivered)
    }

    /// True once payment has been reconciled, i.e. `ON_PROGRESS` or later.
    pub fn is_paid(self) -> bool {
        matches!(
            self,
            Self::OnProgress | Self::Packed | Self::Shipped | Self::Delivered
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitingPayment => "WAITING_PAYMENT",
            Self::OnProgress => "ON_PROGRESS",
            Self::Packed => "PACKED",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING_PAYMENT" => Ok(Self::WaitingPayment),
            "ON_PROGRESS" => Ok(Self::OnProgress),
            "PACKED" => Ok(Self::Packed),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownOrderStatus(other.to_string())),
        }
    }
}

/// Server-computed money fields. Immutable once the order exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderAmounts {
    pub subtotal: Money,
    pub voucher_discount: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

/// Order header row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub uuid: Uuid,
    pub track_id: String,
    pub customer_id: Option<i64>,
    pub contact: ContactInfo,
    pub payment_method: String,
    pub amounts: OrderAmounts,
    pub status: OrderStatus,
    pub expired_at: Option<DateTime<Utc>>,
    pub voucher_id: Option<i64>,
    pub technician_id: Option<i64>,
    pub driver_id: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Waiting for payment past its deadline, i.e. due for lazy expiry.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::WaitingPayment
            && self.expired_at.is_some_and(|deadline| deadline < now)
    }
}

/// Order header before it has an internal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub uuid: Uuid,
    pub track_id: String,
    pub customer_id: Option<i64>,
    pub contact: ContactInfo,
    pub payment_method: String,
    pub amounts: OrderAmounts,
    pub voucher_id: Option<i64>,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized copy of one priced cart line taken at checkout.
///
/// Only `product_id`/`bundle_id`/`variant_id` point back into the catalog;
/// every other field is frozen at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: Option<i64>,
    pub bundle_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub name: String,
    pub category: Option<String>,
    pub variant_name: Option<String>,
    pub bundle_members: Vec<String>,
    pub unit_price: Money,
    pub quantity: i32,
    pub line_total: Money,
    pub image_urls: Vec<String>,
    pub device_id: Option<String>,
}

pub type NewOrderProduct = ProductSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderProduct {
    pub id: i64,
    pub order_id: i64,
    #[serde(flatten)]
    pub snapshot: ProductSnapshot,
}

/// Order with its product snapshot and payment reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub products: Vec<OrderProduct>,
    pub payment: Option<PaymentReference>,
}

/// The identifiers an order can be read by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Id(i64),
    Uuid(Uuid),
    TrackId(String),
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Uuid(uuid) => write!(f, "uuid {uuid}"),
            Self::TrackId(track_id) => write!(f, "track id {track_id}"),
        }
    }
}

/// Admin list filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderFilter {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default = "OrderFilter::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl OrderFilter {
    fn default_limit() -> i64 {
        50
    }
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIdUpdate {
    pub order_product_id: i64,
    pub device_id: String,
}

/// Administrative transition plus optional fulfilment assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvanceOrderRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub technician_id: Option<i64>,
    #[serde(default)]
    pub driver_id: Option<i64>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_ids: Vec<DeviceIdUpdate>,
}
