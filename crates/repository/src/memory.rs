//! In-memory store for tests and local runs.
//!
//! A unit of work holds the store's lock for its whole lifetime and edits a
//! private copy of the state, so transactions are fully serialized and an
//! uncommitted one leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    CatalogBundle, CatalogProduct, Customer, NewOrder, NewOrderProduct, Order, OrderFilter,
    OrderKey, OrderProduct, OrderStatus, PaymentChannel, PaymentReference, Voucher, VoucherStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    CatalogRepository, CustomersRepository, Database, ItemsRepository, OrdersRepository,
    PaymentsRepository, RepositoryError, UnitOfWork, VouchersRepository,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_order_id: i64,
    last_order_product_id: i64,
    orders: BTreeMap<i64, Order>,
    order_products: BTreeMap<i64, OrderProduct>,
    payment_references: HashMap<i64, PaymentReference>,
    vouchers: HashMap<i64, Voucher>,
    voucher_usages: HashMap<(i64, i64), i64>,
}

#[derive(Debug, Default)]
struct Catalog {
    products: HashMap<i64, CatalogProduct>,
    bundles: HashMap<i64, CatalogBundle>,
    customers: HashMap<Uuid, Customer>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    catalog: Arc<RwLock<Catalog>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, product: CatalogProduct) {
        self.catalog.write().await.products.insert(product.id, product);
    }

    pub async fn add_bundle(&self, bundle: CatalogBundle) {
        self.catalog.write().await.bundles.insert(bundle.id, bundle);
    }

    pub async fn add_customer(&self, customer: Customer) {
        self.catalog.write().await.customers.insert(customer.uuid, customer);
    }

    pub async fn add_voucher(&self, voucher: Voucher) {
        self.state.lock().await.vouchers.insert(voucher.id, voucher);
    }

    /// Committed state of a voucher.
    pub async fn voucher(&self, voucher_id: i64) -> Option<Voucher> {
        self.state.lock().await.vouchers.get(&voucher_id).cloned()
    }

    /// Number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Committed usage counter of a customer for a voucher; zero when the
    /// customer never paid an order with it.
    pub async fn voucher_usage(&self, customer_id: i64, voucher_id: i64) -> i64 {
        self.state
            .lock()
            .await
            .voucher_usages
            .get(&(customer_id, voucher_id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of committed payment references.
    pub async fn payment_reference_count(&self) -> usize {
        self.state.lock().await.payment_references.len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

#[async_trait]
impl CatalogRepository for MemoryDatabase {
    async fn products_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let catalog = self.catalog.read().await;
        Ok(ids.iter().filter_map(|id| catalog.products.get(id).cloned()).collect())
    }

    async fn bundles_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogBundle>, RepositoryError> {
        let catalog = self.catalog.read().await;
        Ok(ids.iter().filter_map(|id| catalog.bundles.get(id).cloned()).collect())
    }
}

#[async_trait]
impl CustomersRepository for MemoryDatabase {
    async fn customer_by_uuid(&self, uuid: Uuid) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.catalog.read().await.customers.get(&uuid).cloned())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl OrdersRepository for MemoryUnitOfWork {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let duplicate = self
            .working
            .orders
            .values()
            .any(|o| o.uuid == order.uuid || o.track_id == order.track_id);
        if duplicate {
            return Err(RepositoryError::InvalidData(format!(
                "order {} already exists",
                order.track_id
            )));
        }

        self.working.last_order_id += 1;
        let stored = Order {
            id: self.working.last_order_id,
            uuid: order.uuid,
            track_id: order.track_id.clone(),
            customer_id: order.customer_id,
            contact: order.contact.clone(),
            payment_method: order.payment_method.clone(),
            amounts: order.amounts,
            status: OrderStatus::WaitingPayment,
            expired_at: Some(order.expired_at),
            voucher_id: order.voucher_id,
            technician_id: None,
            driver_id: None,
            scheduled_at: None,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        self.working.orders.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_order(&mut self, key: &OrderKey) -> Result<Option<Order>, RepositoryError> {
        let orders = &self.working.orders;
        let found = match key {
            OrderKey::Id(id) => orders.get(id),
            OrderKey::Uuid(uuid) => orders.values().find(|o| o.uuid == *uuid),
            OrderKey::TrackId(track_id) => orders.values().find(|o| o.track_id == *track_id),
        };
        Ok(found.cloned())
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|status| o.status == status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(filter.offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit.max(0)).unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.status = order.status;
        stored.expired_at = order.expired_at;
        stored.technician_id = order.technician_id;
        stored.driver_id = order.driver_id;
        stored.scheduled_at = order.scheduled_at;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn count_active_claims(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<i64, RepositoryError> {
        let claims = self
            .working
            .orders
            .values()
            .filter(|o| {
                o.customer_id == Some(customer_id)
                    && o.voucher_id == Some(voucher_id)
                    && o.status != OrderStatus::Cancelled
            })
            .count();
        Ok(claims as i64)
    }

    async fn overdue_orders_for_voucher(
        &mut self,
        voucher_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.voucher_id == Some(voucher_id) && o.is_overdue(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ItemsRepository for MemoryUnitOfWork {
    async fn insert_order_products(
        &mut self,
        order_id: i64,
        products: &[NewOrderProduct],
    ) -> Result<Vec<OrderProduct>, RepositoryError> {
        if !self.working.orders.contains_key(&order_id) {
            return Err(RepositoryError::NotFound);
        }
        let mut stored = Vec::with_capacity(products.len());
        for snapshot in products {
            self.working.last_order_product_id += 1;
            let product = OrderProduct {
                id: self.working.last_order_product_id,
                order_id,
                snapshot: snapshot.clone(),
            };
            self.working.order_products.insert(product.id, product.clone());
            stored.push(product);
        }
        Ok(stored)
    }

    async fn order_products(&mut self, order_id: i64) -> Result<Vec<OrderProduct>, RepositoryError> {
        Ok(self
            .working
            .order_products
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn set_device_id(
        &mut self,
        order_product_id: i64,
        device_id: &str,
    ) -> Result<(), RepositoryError> {
        let product = self
            .working
            .order_products
            .get_mut(&order_product_id)
            .ok_or(RepositoryError::NotFound)?;
        product.snapshot.device_id = Some(device_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl PaymentsRepository for MemoryUnitOfWork {
    async fn insert_payment_reference(
        &mut self,
        order_id: i64,
        reference: &PaymentReference,
    ) -> Result<(), RepositoryError> {
        let taken = self.working.payment_references.values().any(|r| {
            r.channel == reference.channel && r.reference == reference.reference
        });
        if taken || self.working.payment_references.contains_key(&order_id) {
            return Err(RepositoryError::InvalidData(format!(
                "duplicate {} {}",
                reference.channel.reference_field(),
                reference.reference
            )));
        }
        self.working
            .payment_references
            .insert(order_id, reference.clone());
        Ok(())
    }

    async fn payment_reference(
        &mut self,
        order_id: i64,
    ) -> Result<Option<PaymentReference>, RepositoryError> {
        Ok(self.working.payment_references.get(&order_id).cloned())
    }

    async fn find_order_id_by_reference(
        &mut self,
        channel: PaymentChannel,
        reference: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        Ok(self
            .working
            .payment_references
            .iter()
            .find(|(_, r)| r.reference_for(channel) == Some(reference))
            .map(|(order_id, _)| *order_id))
    }
}

#[async_trait]
impl VouchersRepository for MemoryUnitOfWork {
    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, RepositoryError> {
        Ok(self
            .working
            .vouchers
            .values()
            .find(|v| v.code == code)
            .cloned())
    }

    async fn set_voucher_status(
        &mut self,
        voucher_id: i64,
        status: VoucherStatus,
    ) -> Result<(), RepositoryError> {
        if let Some(voucher) = self.working.vouchers.get_mut(&voucher_id) {
            voucher.status = status;
        }
        Ok(())
    }

    async fn consume_quota(&mut self, voucher_id: i64) -> Result<bool, RepositoryError> {
        let Some(voucher) = self.working.vouchers.get_mut(&voucher_id) else {
            return Ok(false);
        };
        match voucher.quota {
            None => Ok(true),
            Some(quota) if quota > 0 => {
                voucher.quota = Some(quota - 1);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn restore_quota(&mut self, voucher_id: i64) -> Result<(), RepositoryError> {
        if let Some(quota) = self
            .working
            .vouchers
            .get_mut(&voucher_id)
            .and_then(|v| v.quota.as_mut())
        {
            *quota += 1;
        }
        Ok(())
    }

    async fn record_voucher_usage(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<(), RepositoryError> {
        *self
            .working
            .voucher_usages
            .entry((customer_id, voucher_id))
            .or_insert(0) += 1;
        Ok(())
    }
}
