//! Cancellation side effects shared by lazy expiry, user cancel and late
//! payment callbacks.

use chrono::{DateTime, Utc};
use model::{Order, OrderStatus, PaymentReference};
use payment::PaymentDispatcher;
use repository::{
    OrdersRepository, PaymentsRepository, RepositoryError, UnitOfWork, VouchersRepository,
};
use tracing::{info, warn};

/// Moves `order` to `CANCELLED` inside `tx`: clears `expired_at`, gives its
/// voucher quota back and queues its payment reference in `to_invalidate`,
/// to be invalidated once the transaction has committed.
pub(crate) async fn cancel_in_tx(
    tx: &mut dyn UnitOfWork,
    order: &mut Order,
    now: DateTime<Utc>,
    to_invalidate: &mut Vec<PaymentReference>,
) -> Result<(), RepositoryError> {
    order.status = OrderStatus::Cancelled;
    order.expired_at = None;
    order.updated_at = now;
    tx.update_order(order).await?;

    if let Some(voucher_id) = order.voucher_id {
        tx.restore_quota(voucher_id).await?;
    }

    to_invalidate.extend(tx.payment_reference(order.id).await?);
    Ok(())
}

/// Applies lazy expiry to `order` if it is overdue. Returns whether it did.
pub(crate) async fn expire_if_overdue(
    tx: &mut dyn UnitOfWork,
    order: &mut Order,
    now: DateTime<Utc>,
    to_invalidate: &mut Vec<PaymentReference>,
) -> Result<bool, RepositoryError> {
    if !order.is_overdue(now) {
        return Ok(false);
    }
    info!(track_id = %order.track_id, "Order expired while waiting for payment");
    cancel_in_tx(tx, order, now, to_invalidate).await?;
    Ok(true)
}

/// Best-effort invalidation of outstanding payment requests. Failures are
/// logged and swallowed.
pub(crate) async fn invalidate_all(
    dispatcher: &PaymentDispatcher,
    references: impl IntoIterator<Item = PaymentReference>,
) {
    for reference in references {
        if let Err(e) = dispatcher.invalidate(&reference).await {
            warn!(
                channel = %reference.channel,
                reference = %reference.reference,
                "Failed to invalidate payment request: {e}"
            );
        }
    }
}
