//! Voucher applicability and discount computation.

use std::collections::HashSet;

use model::{Money, Voucher, VoucherStatus, VoucherType};
use thiserror::Error;

use crate::PricedCart;

/// Why a voucher cannot be applied, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherRejection {
    #[error("voucher is not active yet")]
    NotStarted,
    #[error("voucher has ended")]
    Ended,
    #[error("voucher quota is exhausted")]
    QuotaExhausted,
    #[error("voucher already claimed {claimed} time(s), limit is {limit}")]
    ClaimLimitReached { claimed: i64, limit: i32 },
    #[error("cart does not contain every product the voucher requires")]
    ProductScopeNotMet,
    #[error("voucher requires a minimum purchase of {minimum}, got {base}")]
    MinimumNotMet { minimum: Money, base: Money },
}

impl VoucherRejection {
    /// Exhausted or already-claimed vouchers conflict with existing state;
    /// everything else is a problem with the request itself.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::QuotaExhausted | Self::ClaimLimitReached { .. })
    }
}

/// Discount `voucher` grants on `cart`.
///
/// `voucher.status` must already be refreshed against the current time.
/// `prior_claims` is the number of the customer's orders that still hold this
/// voucher (`None` for guest checkouts, which are not claim-limited).
///
/// The result is never negative and never exceeds the discount base.
pub fn evaluate_voucher(
    voucher: &Voucher,
    cart: &PricedCart,
    prior_claims: Option<i64>,
) -> Result<Money, VoucherRejection> {
    match voucher.status {
        VoucherStatus::OnGoing => {}
        VoucherStatus::NotYetReady => return Err(VoucherRejection::NotStarted),
        VoucherStatus::Finish => return Err(VoucherRejection::Ended),
    }

    if voucher.quota.is_some_and(|quota| quota <= 0) {
        return Err(VoucherRejection::QuotaExhausted);
    }

    if let (Some(limit), Some(claimed)) = (voucher.claim_limit_per_user, prior_claims) {
        if claimed >= i64::from(limit) {
            return Err(VoucherRejection::ClaimLimitReached { claimed, limit });
        }
    }

    let base = discount_base(voucher, cart)?;

    if let Some(minimum) = voucher.minimum_amount {
        if base < minimum {
            return Err(VoucherRejection::MinimumNotMet { minimum, base });
        }
    }

    let discount = match voucher.voucher_type {
        VoucherType::Fixed => voucher.discount_amount.min(base),
        VoucherType::Percentage => {
            let raw = base.saturating_mul(voucher.discount_amount) / 100;
            match voucher.max_discount {
                Some(cap) if cap > 0 => raw.min(cap),
                _ => raw,
            }
        }
    };

    Ok(discount.clamp(0, base.max(0)))
}

/// Sum of the in-scope lines for product-scoped vouchers, the whole subtotal
/// otherwise.
fn discount_base(voucher: &Voucher, cart: &PricedCart) -> Result<Money, VoucherRejection> {
    if voucher.product_ids.is_empty() {
        return Ok(cart.subtotal);
    }

    let in_cart: HashSet<i64> = cart.product_ids().collect();
    if !voucher.product_ids.iter().all(|id| in_cart.contains(id)) {
        return Err(VoucherRejection::ProductScopeNotMet);
    }

    let scope: HashSet<i64> = voucher.product_ids.iter().copied().collect();
    Ok(cart
        .lines
        .iter()
        .filter(|line| line.product_id.is_some_and(|id| scope.contains(&id)))
        .map(|line| line.line_total)
        .sum())
}
