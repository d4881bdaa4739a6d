use async_trait::async_trait;
use model::{Order, OrderKey, OrderStatus};
use notification::NotificationTask;
use payment::{classify_callback, verify_callback_token};
use repository::{
    CatalogRepository, CustomersRepository, Database, OrdersRepository, PaymentsRepository,
    VouchersRepository,
};
use tracing::{info, instrument, warn};

use crate::expiry::{expire_if_overdue, invalidate_all};
use crate::{OrderServiceImpl, ServiceError};

/// What a provider callback did to its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The order moved from waiting-for-payment to on-progress.
    Reconciled(Order),
    /// The order was already paid; nothing changed.
    AlreadyReconciled(Order),
}

impl ReconciliationOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Reconciled(order) | Self::AlreadyReconciled(order) => order,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reconciled(_) => "reconciled",
            Self::AlreadyReconciled(_) => "already_reconciled",
        }
    }
}

#[async_trait]
pub trait PaymentWebhookService: Send + Sync {
    /// Authenticates and applies a provider payment callback.
    ///
    /// Redelivery of a callback for an order that is already paid is a no-op
    /// returning [`ReconciliationOutcome::AlreadyReconciled`].
    ///
    /// # Errors
    /// [`ServiceError::Unauthorized`] for a missing or wrong token,
    /// [`ServiceError::InvalidCallback`] for a payload that cannot be mapped
    /// to one channel, [`ServiceError::NotFound`] when no order holds the
    /// reference and [`ServiceError::Conflict`] for cancelled or expired
    /// orders.
    async fn handle_provider_webhook(
        &self,
        token: Option<&str>,
        payload: &[u8],
    ) -> Result<ReconciliationOutcome, ServiceError>;
}

#[async_trait]
impl<D, C, K> PaymentWebhookService for OrderServiceImpl<D, C, K>
where
    D: Database,
    C: CatalogRepository,
    K: CustomersRepository,
{
    #[instrument(skip_all)]
    async fn handle_provider_webhook(
        &self,
        token: Option<&str>,
        payload: &[u8],
    ) -> Result<ReconciliationOutcome, ServiceError> {
        if !verify_callback_token(&self.callback_token, token) {
            warn!("Rejected payment callback with invalid token");
            return Err(ServiceError::Unauthorized);
        }
        let callback = classify_callback(payload)?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let not_found = || {
            ServiceError::NotFound(format!(
                "order for {} reference {}",
                callback.channel, callback.reference
            ))
        };
        let order_id = tx
            .find_order_id_by_reference(callback.channel, &callback.reference)
            .await?
            .ok_or_else(not_found)?;
        let mut order = tx
            .find_order(&OrderKey::Id(order_id))
            .await?
            .ok_or_else(not_found)?;

        if order.status.is_paid() {
            info!(track_id = %order.track_id, "Payment callback redelivered for a paid order");
            return Ok(ReconciliationOutcome::AlreadyReconciled(order));
        }
        if order.status == OrderStatus::Cancelled {
            warn!(track_id = %order.track_id, "Payment callback for a cancelled order");
            return Err(ServiceError::Conflict(format!(
                "order {} is cancelled",
                order.track_id
            )));
        }

        let mut to_invalidate = Vec::new();
        if expire_if_overdue(&mut *tx, &mut order, now, &mut to_invalidate).await? {
            tx.commit().await?;
            invalidate_all(&self.dispatcher, to_invalidate).await;
            warn!(track_id = %order.track_id, "Payment callback arrived after expiry");
            return Err(ServiceError::Conflict(format!(
                "order {} has expired",
                order.track_id
            )));
        }

        if let Some(paid) = callback.paid_amount {
            if paid != order.amounts.total {
                warn!(
                    track_id = %order.track_id,
                    paid,
                    expected = order.amounts.total,
                    "Paid amount differs from order total"
                );
            }
        }

        order.status = OrderStatus::OnProgress;
        order.expired_at = None;
        order.updated_at = now;
        tx.update_order(&order).await?;
        if let (Some(customer_id), Some(voucher_id)) = (order.customer_id, order.voucher_id) {
            tx.record_voucher_usage(customer_id, voucher_id).await?;
        }
        tx.commit().await?;

        info!(track_id = %order.track_id, channel = %callback.channel, "Payment reconciled");
        self.notifications
            .enqueue(NotificationTask::OrderPaid(order.clone()));
        Ok(ReconciliationOutcome::Reconciled(order))
    }
}
