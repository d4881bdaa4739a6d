use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherType {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    NotYetReady,
    OnGoing,
    Finish,
}

impl VoucherStatus {
    /// Status a voucher running from `starts_at` to `ends_at` has at `now`.
    pub fn at(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < starts_at {
            Self::NotYetReady
        } else if now > ends_at {
            Self::Finish
        } else {
            Self::OnGoing
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub voucher_type: VoucherType,
    /// Flat amount for FIXED, whole percent for PERCENTAGE.
    pub discount_amount: Money,
    pub max_discount: Option<Money>,
    pub minimum_amount: Option<Money>,
    /// Remaining global redemptions; `None` is unlimited.
    pub quota: Option<i32>,
    pub claim_limit_per_user: Option<i32>,
    pub status: VoucherStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Eligible product ids. Empty means the whole cart is eligible.
    pub product_ids: Vec<i64>,
}

impl Voucher {
    /// Recomputes the persisted status from the validity window.
    ///
    /// Returns `true` when the status changed and needs to be written back.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> bool {
        let current = VoucherStatus::at(self.starts_at, self.ends_at, now);
        if current == self.status {
            return false;
        }
        self.status = current;
        true
    }
}
