use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use model::{
    AdvanceOrderRequest, CartLine, CreateOrderRequest, Customer, Money, NewOrder, Order,
    OrderDetails, OrderFilter, OrderKey, OrderStatus,
};
use notification::{NotificationQueue, NotificationTask};
use payment::{PaymentDispatcher, PaymentRequest, classify_method};
use pricing::{PricedCart, VoucherRejection, evaluate_voucher, order_amounts, price_cart};
use rand::Rng;
use repository::{
    CatalogRepository, CustomersRepository, Database, ItemsRepository, OrdersRepository,
    PaymentsRepository, UnitOfWork, VouchersRepository,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::expiry::{cancel_in_tx, expire_if_overdue, invalidate_all};
use crate::{Clock, ServiceError};

const MAX_PAGE_SIZE: i64 = 200;
const TRACK_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TRACK_ID_SUFFIX_LEN: usize = 6;
const TRACK_ID_ATTEMPTS: usize = 5;

/// Trait describing business operations for order management.
///
/// Every read path applies lazy expiry before returning: an order still
/// waiting for payment past its `expired_at` is cancelled, its voucher quota
/// restored and its payment request invalidated.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Prices the cart, verifies the client-submitted amounts, opens a
    /// payment request and persists the order atomically.
    ///
    /// # Errors
    /// Validation errors for bad input or amount mismatches (raised before any
    /// provider call), [`ServiceError::Voucher`] for rejected vouchers,
    /// [`ServiceError::Payment`] when the provider fails or times out.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<OrderDetails, ServiceError>;

    async fn get_order_by_id(&self, id: i64) -> Result<OrderDetails, ServiceError>;

    async fn get_order_by_uuid(&self, uuid: Uuid) -> Result<OrderDetails, ServiceError>;

    async fn get_order_by_track_id(&self, track_id: &str) -> Result<OrderDetails, ServiceError>;

    /// Admin list, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError>;

    /// Cancels an order that is still waiting for payment and not yet overdue.
    async fn cancel_order(&self, track_id: &str) -> Result<Order, ServiceError>;

    /// Administrative transition with optional assignment and device ids.
    async fn advance_order_status(
        &self,
        uuid: Uuid,
        request: &AdvanceOrderRequest,
    ) -> Result<OrderDetails, ServiceError>;
}

/// Tunables of the order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSettings {
    /// How long a new order waits for payment.
    pub order_expiry: Duration,
    pub delivery_fee: Money,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            order_expiry: Duration::hours(24),
            delivery_fee: 0,
        }
    }
}

/// Implementation of [`OrderService`] and
/// [`crate::PaymentWebhookService`] over a transactional [`Database`].
///
/// Catalog and customer lookups are injected separately so they can live in
/// another store.
pub struct OrderServiceImpl<D, C, K> {
    pub(crate) db: D,
    catalog: C,
    customers: K,
    pub(crate) dispatcher: PaymentDispatcher,
    pub(crate) notifications: NotificationQueue,
    pub(crate) clock: Arc<dyn Clock>,
    settings: OrderSettings,
    pub(crate) callback_token: String,
}

impl<D, C, K> OrderServiceImpl<D, C, K>
where
    D: Database,
    C: CatalogRepository,
    K: CustomersRepository,
{
    /// Constructs a new [`OrderServiceImpl`] from the provided dependencies.
    ///
    /// `callback_token` is the shared secret provider callbacks must present.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: D,
        catalog: C,
        customers: K,
        dispatcher: PaymentDispatcher,
        notifications: NotificationQueue,
        clock: Arc<dyn Clock>,
        settings: OrderSettings,
        callback_token: impl Into<String>,
    ) -> Self {
        Self {
            db,
            catalog,
            customers,
            dispatcher,
            notifications,
            clock,
            settings,
            callback_token: callback_token.into(),
        }
    }

    /// Validates the fields that pricing does not look at.
    fn validate_request(&self, request: &CreateOrderRequest) -> Result<(), ServiceError> {
        let contact = &request.contact;
        if contact.name.trim().is_empty() {
            return Err(ServiceError::InvalidOrder("contact name is empty".into()));
        }
        if contact.email.trim().is_empty() || !contact.email.contains('@') {
            return Err(ServiceError::InvalidOrder("contact email is invalid".into()));
        }
        if contact.phone.trim().is_empty() {
            return Err(ServiceError::InvalidOrder("contact phone is empty".into()));
        }
        classify_method(&request.payment_method)?;
        Ok(())
    }

    async fn resolve_customer(&self, uuid: Option<Uuid>) -> Result<Option<Customer>, ServiceError> {
        let Some(uuid) = uuid else {
            return Ok(None);
        };
        self.customers
            .customer_by_uuid(uuid)
            .await?
            .map(Some)
            .ok_or_else(|| ServiceError::NotFound(format!("customer {uuid}")))
    }

    async fn price(&self, lines: &[CartLine]) -> Result<PricedCart, ServiceError> {
        let mut product_ids = BTreeSet::new();
        let mut bundle_ids = BTreeSet::new();
        for line in lines {
            match line {
                CartLine::Product { product_id, .. } => product_ids.insert(*product_id),
                CartLine::Bundle { bundle_id, .. } => bundle_ids.insert(*bundle_id),
            };
        }
        let product_ids: Vec<i64> = product_ids.into_iter().collect();
        let bundle_ids: Vec<i64> = bundle_ids.into_iter().collect();

        let products = if product_ids.is_empty() {
            Vec::new()
        } else {
            self.catalog.products_by_ids(&product_ids).await?
        };
        let bundles = if bundle_ids.is_empty() {
            Vec::new()
        } else {
            self.catalog.bundles_by_ids(&bundle_ids).await?
        };

        Ok(price_cart(lines, &products, &bundles)?)
    }

    /// Expires the overdue orders still holding the voucher, refreshes its
    /// status, then evaluates it against the cart.
    async fn apply_voucher(
        &self,
        code: &str,
        customer: Option<&Customer>,
        cart: &PricedCart,
        now: DateTime<Utc>,
    ) -> Result<AppliedVoucher, ServiceError> {
        let mut tx = self.db.begin().await?;
        let voucher_id = tx
            .find_voucher_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("voucher {code}")))?
            .id;

        let mut to_invalidate = Vec::new();
        for mut order in tx.overdue_orders_for_voucher(voucher_id, now).await? {
            expire_if_overdue(&mut *tx, &mut order, now, &mut to_invalidate).await?;
        }

        // Re-read: expiry may have given quota back.
        let mut voucher = tx
            .find_voucher_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("voucher {code}")))?;
        if voucher.refresh_status(now) {
            tx.set_voucher_status(voucher.id, voucher.status).await?;
        }
        let prior_claims = match customer {
            Some(customer) => Some(tx.count_active_claims(customer.id, voucher.id).await?),
            None => None,
        };
        tx.commit().await?;
        invalidate_all(&self.dispatcher, to_invalidate).await;

        let discount = evaluate_voucher(&voucher, cart, prior_claims)?;
        Ok(AppliedVoucher {
            id: voucher.id,
            discount,
            claim_limit: voucher.claim_limit_per_user,
        })
    }

    /// Draws a track id no stored order uses yet.
    async fn unique_track_id(&self, now: DateTime<Utc>) -> Result<String, ServiceError> {
        let mut tx = self.db.begin().await?;
        let track_id = pick_track_id(&mut *tx, || generate_track_id(now)).await?;
        tx.commit().await?;
        Ok(track_id)
    }

    async fn load_details(
        tx: &mut dyn UnitOfWork,
        order: Order,
    ) -> Result<OrderDetails, ServiceError> {
        let products = tx.order_products(order.id).await?;
        let payment = tx.payment_reference(order.id).await?;
        Ok(OrderDetails {
            order,
            products,
            payment,
        })
    }

    /// Reads one order with lazy expiry applied.
    async fn read_order(&self, key: OrderKey) -> Result<OrderDetails, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let mut order = tx
            .find_order(&key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {key}")))?;

        let mut to_invalidate = Vec::new();
        expire_if_overdue(&mut *tx, &mut order, now, &mut to_invalidate).await?;
        let details = Self::load_details(&mut *tx, order).await?;
        tx.commit().await?;

        invalidate_all(&self.dispatcher, to_invalidate).await;
        Ok(details)
    }
}

/// Voucher accepted at checkout.
struct AppliedVoucher {
    id: i64,
    discount: Money,
    claim_limit: Option<i32>,
}

fn check_amount(field: &'static str, submitted: Money, computed: Money) -> Result<(), ServiceError> {
    if submitted != computed {
        return Err(ServiceError::AmountMismatch {
            field,
            submitted,
            computed,
        });
    }
    Ok(())
}

fn generate_track_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TRACK_ID_SUFFIX_LEN)
        .map(|_| char::from(TRACK_ID_ALPHABET[rng.gen_range(0..TRACK_ID_ALPHABET.len())]))
        .collect();
    format!("ORD-{}-{suffix}", now.format("%Y%m%d"))
}

async fn pick_track_id(
    tx: &mut dyn UnitOfWork,
    mut generate: impl FnMut() -> String + Send,
) -> Result<String, ServiceError> {
    for _ in 0..TRACK_ID_ATTEMPTS {
        let track_id = generate();
        let key = OrderKey::TrackId(track_id.clone());
        if tx.find_order(&key).await?.is_none() {
            return Ok(track_id);
        }
        warn!(%track_id, "Track id already taken, drawing another");
    }
    Err(ServiceError::Conflict("could not allocate a unique track id".into()))
}

#[async_trait]
impl<D, C, K> OrderService for OrderServiceImpl<D, C, K>
where
    D: Database,
    C: CatalogRepository,
    K: CustomersRepository,
{
    #[instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<OrderDetails, ServiceError> {
        self.validate_request(request)?;
        let now = self.clock.now();

        let customer = self.resolve_customer(request.customer_uuid).await?;
        let cart = self.price(&request.lines).await?;

        let voucher_code = request
            .voucher_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());
        let voucher = match voucher_code {
            Some(code) => Some(self.apply_voucher(code, customer.as_ref(), &cart, now).await?),
            None => None,
        };
        let voucher_id = voucher.as_ref().map(|v| v.id);
        let discount = voucher.as_ref().map_or(0, |v| v.discount);

        let amounts = order_amounts(cart.subtotal, discount, self.settings.delivery_fee)?;
        check_amount("subtotal", request.subtotal, amounts.subtotal)?;
        check_amount("voucher_discount", request.voucher_discount, amounts.voucher_discount)?;
        check_amount("delivery_fee", request.delivery_fee, amounts.delivery_fee)?;
        check_amount("total", request.total, amounts.total)?;

        let track_id = self.unique_track_id(now).await?;
        let expires_at = now + self.settings.order_expiry;

        let reference = self
            .dispatcher
            .create_payment(&PaymentRequest {
                track_id: &track_id,
                method_code: &request.payment_method,
                amount: amounts.total,
                contact: &request.contact,
                expires_at,
                items: &cart.lines,
            })
            .await?;

        let mut tx = self.db.begin().await?;
        if let Some(voucher) = &voucher {
            if !tx.consume_quota(voucher.id).await? {
                drop(tx);
                warn!(
                    %track_id,
                    voucher_id = voucher.id,
                    "Voucher quota ran out before the order was stored"
                );
                invalidate_all(&self.dispatcher, [reference]).await;
                return Err(ServiceError::Conflict("voucher quota is exhausted".into()));
            }
            // The quota update locks the voucher row, so concurrent checkouts
            // of the same customer are counted one after the other here.
            if let (Some(customer), Some(limit)) = (&customer, voucher.claim_limit) {
                let claimed = tx.count_active_claims(customer.id, voucher.id).await?;
                if claimed >= i64::from(limit) {
                    drop(tx);
                    warn!(
                        %track_id,
                        voucher_id = voucher.id,
                        claimed,
                        "Voucher claim limit reached before the order was stored"
                    );
                    invalidate_all(&self.dispatcher, [reference]).await;
                    return Err(VoucherRejection::ClaimLimitReached { claimed, limit }.into());
                }
            }
        }

        let new_order = NewOrder {
            uuid: Uuid::new_v4(),
            track_id: track_id.clone(),
            customer_id: customer.as_ref().map(|c| c.id),
            contact: request.contact.clone(),
            payment_method: request.payment_method.clone(),
            amounts,
            voucher_id,
            expired_at: expires_at,
            created_at: now,
        };
        let persisted = async {
            let order = tx.insert_order(&new_order).await?;
            let products = tx.insert_order_products(order.id, &cart.lines).await?;
            tx.insert_payment_reference(order.id, &reference).await?;
            tx.commit().await?;
            Ok::<_, ServiceError>((order, products))
        }
        .await;

        let (order, products) = match persisted {
            Ok(stored) => stored,
            Err(e) => {
                error!(
                    %track_id,
                    channel = %reference.channel,
                    reference = %reference.reference,
                    "Payment request opened but order could not be stored: {e}"
                );
                return Err(e);
            }
        };

        info!(%track_id, total = amounts.total, "Order created");
        self.notifications
            .enqueue(NotificationTask::OrderCreated(order.clone()));

        Ok(OrderDetails {
            order,
            products,
            payment: Some(reference),
        })
    }

    #[instrument(skip(self))]
    async fn get_order_by_id(&self, id: i64) -> Result<OrderDetails, ServiceError> {
        self.read_order(OrderKey::Id(id)).await
    }

    #[instrument(skip(self))]
    async fn get_order_by_uuid(&self, uuid: Uuid) -> Result<OrderDetails, ServiceError> {
        self.read_order(OrderKey::Uuid(uuid)).await
    }

    #[instrument(skip(self))]
    async fn get_order_by_track_id(&self, track_id: &str) -> Result<OrderDetails, ServiceError> {
        self.read_order(OrderKey::TrackId(track_id.to_string())).await
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let filter = OrderFilter {
            status: filter.status,
            limit: filter.limit.clamp(1, MAX_PAGE_SIZE),
            offset: filter.offset.max(0),
        };
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;
        let mut orders = tx.list_orders(&filter).await?;

        let mut to_invalidate = Vec::new();
        for order in orders.iter_mut().filter(|o| o.is_overdue(now)) {
            // Re-read under lock so a concurrent payment callback wins or loses cleanly.
            if let Some(mut locked) = tx.find_order(&OrderKey::Id(order.id)).await? {
                expire_if_overdue(&mut *tx, &mut locked, now, &mut to_invalidate).await?;
                *order = locked;
            }
        }
        tx.commit().await?;
        if let Some(status) = filter.status {
            orders.retain(|o| o.status == status);
        }

        invalidate_all(&self.dispatcher, to_invalidate).await;
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, track_id: &str) -> Result<Order, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let mut order = tx
            .find_order(&OrderKey::TrackId(track_id.to_string()))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order track id {track_id}")))?;

        let mut to_invalidate = Vec::new();
        if expire_if_overdue(&mut *tx, &mut order, now, &mut to_invalidate).await? {
            tx.commit().await?;
            invalidate_all(&self.dispatcher, to_invalidate).await;
            return Err(ServiceError::Conflict("order has expired".into()));
        }
        if order.status != OrderStatus::WaitingPayment {
            return Err(ServiceError::Conflict(format!(
                "order in status {} cannot be cancelled",
                order.status
            )));
        }

        cancel_in_tx(&mut *tx, &mut order, now, &mut to_invalidate).await?;
        tx.commit().await?;
        info!("Order cancelled by customer");

        invalidate_all(&self.dispatcher, to_invalidate).await;
        Ok(order)
    }

    #[instrument(skip(self, request), fields(target = %request.status))]
    async fn advance_order_status(
        &self,
        uuid: Uuid,
        request: &AdvanceOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        let target = request.status;
        if matches!(target, OrderStatus::WaitingPayment | OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidOrder(format!(
                "status {target} cannot be set administratively"
            )));
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;
        let mut order = tx
            .find_order(&OrderKey::Uuid(uuid))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order uuid {uuid}")))?;

        let mut to_invalidate = Vec::new();
        if expire_if_overdue(&mut *tx, &mut order, now, &mut to_invalidate).await? {
            tx.commit().await?;
            invalidate_all(&self.dispatcher, to_invalidate).await;
            return Err(ServiceError::Conflict("order has expired".into()));
        }
        if !order.status.can_transition_to(target) {
            return Err(ServiceError::Conflict(format!(
                "order cannot move from {} to {target}",
                order.status
            )));
        }

        let products = tx.order_products(order.id).await?;
        if let Some(foreign) = request
            .device_ids
            .iter()
            .find(|update| !products.iter().any(|p| p.id == update.order_product_id))
        {
            return Err(ServiceError::InvalidOrder(format!(
                "order product {} does not belong to this order",
                foreign.order_product_id
            )));
        }
        for update in &request.device_ids {
            tx.set_device_id(update.order_product_id, &update.device_id)
                .await?;
        }

        order.status = target;
        if target == OrderStatus::OnProgress {
            order.expired_at = None;
        }
        if request.technician_id.is_some() {
            order.technician_id = request.technician_id;
        }
        if request.driver_id.is_some() {
            order.driver_id = request.driver_id;
        }
        if request.scheduled_at.is_some() {
            order.scheduled_at = request.scheduled_at;
        }
        order.updated_at = now;
        tx.update_order(&order).await?;

        let details = Self::load_details(&mut *tx, order).await?;
        tx.commit().await?;
        info!(track_id = %details.order.track_id, "Order status advanced");
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use model::{ContactInfo, OrderAmounts};
    use repository::MemoryDatabase;

    use super::*;

    async fn store_track_id(db: &MemoryDatabase, track_id: &str) -> Result<(), ServiceError> {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        let mut tx = db.begin().await?;
        tx.insert_order(&NewOrder {
            uuid: Uuid::new_v4(),
            track_id: track_id.to_string(),
            customer_id: None,
            contact: ContactInfo::default(),
            payment_method: "BCA".to_string(),
            amounts: OrderAmounts {
                subtotal: 50_000,
                voucher_discount: 0,
                delivery_fee: 0,
                total: 50_000,
            },
            voucher_id: None,
            expired_at: now + Duration::hours(24),
            created_at: now,
        })
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[test]
    fn test_track_id_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        let track_id = generate_track_id(now);

        assert!(track_id.starts_with("ORD-20261016-"), "{track_id}");
        let suffix = &track_id["ORD-20261016-".len()..];
        assert_eq!(suffix.len(), TRACK_ID_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| TRACK_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_check_amount_reports_field() {
        assert!(check_amount("total", 100, 100).is_ok());
        assert!(matches!(
            check_amount("total", 99, 100),
            Err(ServiceError::AmountMismatch { field: "total", submitted: 99, computed: 100 })
        ));
    }

    #[tokio::test]
    async fn test_taken_track_id_is_redrawn() -> Result<(), ServiceError> {
        let db = MemoryDatabase::new();
        store_track_id(&db, "ORD-20261016-AAAAAA").await?;

        let mut draws = ["ORD-20261016-AAAAAA", "ORD-20261016-BBBBBB"].into_iter();
        let mut tx = db.begin().await?;
        let track_id = pick_track_id(&mut *tx, || draws.next().unwrap_or_default().to_string()).await?;
        assert_eq!(track_id, "ORD-20261016-BBBBBB");
        Ok(())
    }

    #[tokio::test]
    async fn test_track_id_gives_up_after_repeated_collisions() -> Result<(), ServiceError> {
        let db = MemoryDatabase::new();
        store_track_id(&db, "ORD-20261016-AAAAAA").await?;

        let mut draws = 0;
        let mut tx = db.begin().await?;
        let result = pick_track_id(&mut *tx, || {
            draws += 1;
            "ORD-20261016-AAAAAA".to_string()
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(draws, TRACK_ID_ATTEMPTS);
        Ok(())
    }
}
