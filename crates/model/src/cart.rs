use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Money;

/// One line of a submitted cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartLine {
    Product {
        product_id: i64,
        variant_id: Option<i64>,
        quantity: i32,
        #[serde(default)]
        device_id: Option<String>,
    },
    Bundle {
        bundle_id: i64,
        quantity: i32,
        #[serde(default)]
        device_id: Option<String>,
    },
}

impl CartLine {
    pub fn quantity(&self) -> i32 {
        match self {
            Self::Product { quantity, .. } | Self::Bundle { quantity, .. } => *quantity,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Product { device_id, .. } | Self::Bundle { device_id, .. } => device_id.as_deref(),
        }
    }

    /// Product id for simple-product lines, `None` for bundles.
    pub fn product_id(&self) -> Option<i64> {
        match self {
            Self::Product { product_id, .. } => Some(*product_id),
            Self::Bundle { .. } => None,
        }
    }
}

/// Contact snapshot stored on the order, detached from the customer profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Checkout input. The money fields are what the client believes the order
/// costs; they must match the server-side computation exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_uuid: Option<Uuid>,
    pub contact: ContactInfo,
    pub payment_method: String,
    #[serde(default)]
    pub voucher_code: Option<String>,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    #[serde(default)]
    pub voucher_discount: Money,
    #[serde(default)]
    pub delivery_fee: Money,
    pub total: Money,
}
