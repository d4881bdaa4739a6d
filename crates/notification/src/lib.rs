//! Fire-and-forget order notifications.
//!
//! Request handlers push a [`NotificationTask`] onto a bounded
//! [`NotificationQueue`] and move on; a single [`NotificationWorker`] delivers
//! the tasks through a [`Notifier`]. A full queue or a failed delivery is
//! logged and dropped, never reported back to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use model::Order;
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTask {
    OrderCreated(Order),
    OrderPaid(Order),
}

impl NotificationTask {
    fn track_id(&self) -> &str {
        match self {
            Self::OrderCreated(order) | Self::OrderPaid(order) => &order.track_id,
        }
    }
}

/// Outbound receipt channel (e-mail, push, ...).
#[automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_created_receipt(&self, order: &Order) -> Result<(), NotificationError>;
    async fn send_order_paid_receipt(&self, order: &Order) -> Result<(), NotificationError>;
}

/// Notifier that only writes the receipt to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_created_receipt(&self, order: &Order) -> Result<(), NotificationError> {
        info!(track_id = %order.track_id, total = order.amounts.total, "Order created receipt");
        Ok(())
    }

    async fn send_order_paid_receipt(&self, order: &Order) -> Result<(), NotificationError> {
        info!(track_id = %order.track_id, total = order.amounts.total, "Order paid receipt");
        Ok(())
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationTask>,
}

impl NotificationQueue {
    /// Queues a task without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, task: NotificationTask) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(track_id = task.track_id(), "Notification queue full, dropping task");
                false
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(track_id = task.track_id(), "Notification worker stopped, dropping task");
                false
            }
        }
    }
}

/// Consumer side of the queue.
pub struct NotificationWorker {
    rx: mpsc::Receiver<NotificationTask>,
    notifier: Arc<dyn Notifier>,
}

/// Creates a queue bounded to `capacity` tasks and the worker that drains it.
pub fn channel(capacity: usize, notifier: Arc<dyn Notifier>) -> (NotificationQueue, NotificationWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (NotificationQueue { tx }, NotificationWorker { rx, notifier })
}

impl NotificationWorker {
    /// Delivers tasks until `shutdown` fires or every queue handle is gone.
    ///
    /// On shutdown the queue is closed and the tasks already in it are still
    /// delivered before returning.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        let notified = shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        loop {
            tokio::select! {
                maybe_task = self.rx.recv() => {
                    match maybe_task {
                        Some(task) => self.deliver(task).await,
                        None => {
                            debug!("Notification queue closed.");
                            return;
                        }
                    }
                }
                _ = &mut notified => {
                    info!("Notification worker received shutdown signal.");
                    break;
                }
            }
        }

        self.rx.close();
        while let Some(task) = self.rx.recv().await {
            self.deliver(task).await;
        }
        info!("Notification worker stopped.");
    }

    async fn deliver(&self, task: NotificationTask) {
        let result = match &task {
            NotificationTask::OrderCreated(order) => {
                self.notifier.send_order_created_receipt(order).await
            }
            NotificationTask::OrderPaid(order) => self.notifier.send_order_paid_receipt(order).await,
        };
        if let Err(e) = result {
            error!(track_id = task.track_id(), "Failed to send notification: {e}");
        }
    }
}
