//! # Data Repository Layer
//!
//! Storage ports for orders, order products, payment references and
//! vouchers, plus read-only catalog and customer lookups.
//!
//! Writes go through a [`UnitOfWork`] obtained from [`Database::begin`]. A unit
//! of work is one database transaction: every repository call made on it is
//! applied atomically on [`UnitOfWork::commit`] and discarded if it is dropped
//! uncommitted. Order rows read through it are locked until the transaction
//! ends, which serializes concurrent writers of the same order.
//!
//! Two implementations are provided: [`pg`] on PostgreSQL and [`memory`] for
//! tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{
    CatalogBundle, CatalogProduct, Customer, NewOrder, NewOrderProduct, Order, OrderFilter,
    OrderKey, OrderProduct, PaymentChannel, PaymentReference, Voucher, VoucherStatus,
};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod pg;

pub use memory::MemoryDatabase;
pub use pg::{PgCatalogRepository, PgCustomersRepository, PgDatabase};

/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    /// No result found.
    #[error("Not found")]
    NotFound,
    /// A stored row could not be mapped onto the domain model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
    /// The unit of work was used after its transaction ended.
    #[error("Transaction already closed")]
    TransactionClosed,
}

/// Order headers.
#[async_trait]
pub trait OrdersRepository: Send {
    /// Inserts a new order in `WAITING_PAYMENT` and returns the stored row.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Loads an order and locks it for the rest of the transaction.
    async fn find_order(&mut self, key: &OrderKey) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    /// Writes back the mutable part of an order: status, `expired_at`,
    /// assignment fields and `updated_at`. Money fields are never touched.
    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    /// Number of the customer's orders against the voucher that were not
    /// cancelled.
    async fn count_active_claims(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<i64, RepositoryError>;

    /// Orders against the voucher still waiting for payment past their
    /// deadline at `now`, locked like [`OrdersRepository::find_order`].
    async fn overdue_orders_for_voucher(
        &mut self,
        voucher_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError>;
}

/// Per-order product snapshot.
#[async_trait]
pub trait ItemsRepository: Send {
    async fn insert_order_products(
        &mut self,
        order_id: i64,
        products: &[NewOrderProduct],
    ) -> Result<Vec<OrderProduct>, RepositoryError>;

    async fn order_products(&mut self, order_id: i64) -> Result<Vec<OrderProduct>, RepositoryError>;

    async fn set_device_id(
        &mut self,
        order_product_id: i64,
        device_id: &str,
    ) -> Result<(), RepositoryError>;
}

/// Payment references, indexed by their sparse per-channel reference field.
#[async_trait]
pub trait PaymentsRepository: Send {
    async fn insert_payment_reference(
        &mut self,
        order_id: i64,
        reference: &PaymentReference,
    ) -> Result<(), RepositoryError>;

    async fn payment_reference(
        &mut self,
        order_id: i64,
    ) -> Result<Option<PaymentReference>, RepositoryError>;

    /// Resolves the order owning `reference` in `channel`'s reference field.
    async fn find_order_id_by_reference(
        &mut self,
        channel: PaymentChannel,
        reference: &str,
    ) -> Result<Option<i64>, RepositoryError>;
}

#[async_trait]
pub trait VouchersRepository: Send {
    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, RepositoryError>;

    async fn set_voucher_status(
        &mut self,
        voucher_id: i64,
        status: VoucherStatus,
    ) -> Result<(), RepositoryError>;

    /// Takes one unit of quota. Returns `false` when the quota is exhausted;
    /// unlimited vouchers always succeed.
    async fn consume_quota(&mut self, voucher_id: i64) -> Result<bool, RepositoryError>;

    /// Gives one unit of quota back. No-op for unlimited vouchers.
    async fn restore_quota(&mut self, voucher_id: i64) -> Result<(), RepositoryError>;

    /// Upserts the customer's usage counter for the voucher.
    async fn record_voucher_usage(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<(), RepositoryError>;
}

/// One open transaction across all order-side repositories.
#[async_trait]
pub trait UnitOfWork:
    OrdersRepository + ItemsRepository + PaymentsRepository + VouchersRepository + Send
{
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Entry point to the transactional store.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;
}

/// Read-only catalog lookups. Missing ids are simply absent from the result.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn products_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogProduct>, RepositoryError>;
    async fn bundles_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogBundle>, RepositoryError>;
}

#[async_trait]
pub trait CustomersRepository: Send + Sync {
    async fn customer_by_uuid(&self, uuid: Uuid) -> Result<Option<Customer>, RepositoryError>;
}

