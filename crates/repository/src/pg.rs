//! PostgreSQL implementations of the repository traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use model::{
    BundleMember, CatalogBundle, CatalogProduct, ContactInfo, Customer, NewOrder, NewOrderProduct,
    Order, OrderAmounts, OrderFilter, OrderKey, OrderProduct, OrderStatus, PaymentChannel,
    PaymentReference, ProductSnapshot, ProductVariant, Voucher, VoucherStatus, VoucherType,
};
use postgres_types::{FromSql, ToSql};
use tokio_postgres::Row;
use tracing::warn;
use uuid::Uuid;

use crate::{
    CatalogRepository, CustomersRepository, Database, ItemsRepository, OrdersRepository,
    PaymentsRepository, RepositoryError, UnitOfWork, VouchersRepository,
};

#[derive(Debug, Clone, Copy, ToSql, FromSql)]
#[postgres(name = "order_status")]
enum PgOrderStatus {
    #[postgres(name = "WAITING_PAYMENT")]
    WaitingPayment,
    #[postgres(name = "ON_PROGRESS")]
    OnProgress,
    #[postgres(name = "PACKED")]
    Packed,
    #[postgres(name = "SHIPPED")]
    Shipped,
    #[postgres(name = "DELIVERED")]
    Delivered,
    #[postgres(name = "CANCELLED")]
    Cancelled,
}

impl From<OrderStatus> for PgOrderStatus {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::WaitingPayment => Self::WaitingPayment,
            OrderStatus::OnProgress => Self::OnProgress,
            OrderStatus::Packed => Self::Packed,
            OrderStatus::Shipped => Self::Shipped,
            OrderStatus::Delivered => Self::Delivered,
            OrderStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<PgOrderStatus> for OrderStatus {
    fn from(status: PgOrderStatus) -> Self {
        match status {
            PgOrderStatus::WaitingPayment => Self::WaitingPayment,
            PgOrderStatus::OnProgress => Self::OnProgress,
            PgOrderStatus::Packed => Self::Packed,
            PgOrderStatus::Shipped => Self::Shipped,
            PgOrderStatus::Delivered => Self::Delivered,
            PgOrderStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, ToSql, FromSql)]
#[postgres(name = "voucher_type")]
enum PgVoucherType {
    #[postgres(name = "FIXED")]
    Fixed,
    #[postgres(name = "PERCENTAGE")]
    Percentage,
}

impl From<PgVoucherType> for VoucherType {
    fn from(value: PgVoucherType) -> Self {
        match value {
            PgVoucherType::Fixed => Self::Fixed,
            PgVoucherType::Percentage => Self::Percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, ToSql, FromSql)]
#[postgres(name = "voucher_status")]
enum PgVoucherStatus {
    #[postgres(name = "NOT_YET_READY")]
    NotYetReady,
    #[postgres(name = "ON_GOING")]
    OnGoing,
    #[postgres(name = "FINISH")]
    Finish,
}

impl From<VoucherStatus> for PgVoucherStatus {
    fn from(value: VoucherStatus) -> Self {
        match value {
            VoucherStatus::NotYetReady => Self::NotYetReady,
            VoucherStatus::OnGoing => Self::OnGoing,
            VoucherStatus::Finish => Self::Finish,
        }
    }
}

impl From<PgVoucherStatus> for VoucherStatus {
    fn from(value: PgVoucherStatus) -> Self {
        match value {
            PgVoucherStatus::NotYetReady => Self::NotYetReady,
            PgVoucherStatus::OnGoing => Self::OnGoing,
            PgVoucherStatus::Finish => Self::Finish,
        }
    }
}

#[derive(Debug, Clone, Copy, ToSql, FromSql)]
#[postgres(name = "payment_channel")]
enum PgPaymentChannel {
    #[postgres(name = "VIRTUAL_ACCOUNT")]
    VirtualAccount,
    #[postgres(name = "E_WALLET")]
    EWallet,
    #[postgres(name = "QR_CODE")]
    QrCode,
    #[postgres(name = "PAYLATER")]
    Paylater,
    #[postgres(name = "RETAIL_OUTLET")]
    RetailOutlet,
}

impl From<PaymentChannel> for PgPaymentChannel {
    fn from(value: PaymentChannel) -> Self {
        match value {
            PaymentChannel::VirtualAccount => Self::VirtualAccount,
            PaymentChannel::EWallet => Self::EWallet,
            PaymentChannel::QrCode => Self::QrCode,
            PaymentChannel::Paylater => Self::Paylater,
            PaymentChannel::RetailOutlet => Self::RetailOutlet,
        }
    }
}

impl From<PgPaymentChannel> for PaymentChannel {
    fn from(value: PgPaymentChannel) -> Self {
        match value {
            PgPaymentChannel::VirtualAccount => Self::VirtualAccount,
            PgPaymentChannel::EWallet => Self::EWallet,
            PgPaymentChannel::QrCode => Self::QrCode,
            PgPaymentChannel::Paylater => Self::Paylater,
            PgPaymentChannel::RetailOutlet => Self::RetailOutlet,
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    id, uuid, track_id, customer_id, contact_name, contact_email, contact_phone,
    payment_method, subtotal, voucher_discount, delivery_fee, total, status,
    expired_at, voucher_id, technician_id, driver_id, scheduled_at, created_at, updated_at
"#;

const ORDER_PRODUCT_COLUMNS: &str = r#"
    id, order_id, product_id, bundle_id, variant_id, name, category, variant_name,
    bundle_members, unit_price, quantity, line_total, image_urls, device_id
"#;

fn order_from_row(row: &Row) -> Result<Order, RepositoryError> {
    let status: PgOrderStatus = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        uuid: row.try_get("uuid")?,
        track_id: row.try_get("track_id")?,
        customer_id: row.try_get("customer_id")?,
        contact: ContactInfo {
            name: row.try_get("contact_name")?,
            email: row.try_get("contact_email")?,
            phone: row.try_get("contact_phone")?,
        },
        payment_method: row.try_get("payment_method")?,
        amounts: OrderAmounts {
            subtotal: row.try_get("subtotal")?,
            voucher_discount: row.try_get("voucher_discount")?,
            delivery_fee: row.try_get("delivery_fee")?,
            total: row.try_get("total")?,
        },
        status: status.into(),
        expired_at: row.try_get("expired_at")?,
        voucher_id: row.try_get("voucher_id")?,
        technician_id: row.try_get("technician_id")?,
        driver_id: row.try_get("driver_id")?,
        scheduled_at: row.try_get("scheduled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_product_from_row(row: &Row) -> Result<OrderProduct, RepositoryError> {
    Ok(OrderProduct {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        snapshot: ProductSnapshot {
            product_id: row.try_get("product_id")?,
            bundle_id: row.try_get("bundle_id")?,
            variant_id: row.try_get("variant_id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            variant_name: row.try_get("variant_name")?,
            bundle_members: row.try_get("bundle_members")?,
            unit_price: row.try_get("unit_price")?,
            quantity: row.try_get("quantity")?,
            line_total: row.try_get("line_total")?,
            image_urls: row.try_get("image_urls")?,
            device_id: row.try_get("device_id")?,
        },
    })
}

fn payment_reference_from_row(row: &Row) -> Result<PaymentReference, RepositoryError> {
    let channel: PaymentChannel = row.try_get::<_, PgPaymentChannel>("channel")?.into();
    let reference: Option<String> = row.try_get(channel.reference_field())?;
    let reference = reference.ok_or_else(|| {
        RepositoryError::InvalidData(format!("{} is null for a {channel} payment", channel.reference_field()))
    })?;

    Ok(PaymentReference {
        channel,
        reference,
        provider_id: row.try_get("provider_id")?,
        account_number: row.try_get("account_number")?,
        checkout_url: row.try_get("checkout_url")?,
        qr_string: row.try_get("qr_string")?,
        payment_code: row.try_get("payment_code")?,
    })
}

fn voucher_from_row(row: &Row) -> Result<Voucher, RepositoryError> {
    let voucher_type: PgVoucherType = row.try_get("voucher_type")?;
    let status: PgVoucherStatus = row.try_get("status")?;
    Ok(Voucher {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        voucher_type: voucher_type.into(),
        discount_amount: row.try_get("discount_amount")?,
        max_discount: row.try_get("max_discount")?,
        minimum_amount: row.try_get("minimum_amount")?,
        quota: row.try_get("quota")?,
        claim_limit_per_user: row.try_get("claim_limit_per_user")?,
        status: status.into(),
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        product_ids: row.try_get("product_ids")?,
    })
}

/// Transactional store backed by a connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: Pool,
}

impl PgDatabase {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let client = self.pool.get().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgUnitOfWork {
            client: Some(client),
        }))
    }
}

/// A pooled connection with an open transaction.
///
/// Dropping it uncommitted rolls the transaction back before the connection
/// goes back to the pool.
pub struct PgUnitOfWork {
    client: Option<Object>,
}

impl PgUnitOfWork {
    fn client(&self) -> Result<&Object, RepositoryError> {
        self.client.as_ref().ok_or(RepositoryError::TransactionClosed)
    }
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "Rollback failed");
                    }
                });
            }
            // No runtime to roll back on: detach the connection so a live
            // transaction never returns to the pool.
            Err(_) => drop(Object::take(client)),
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        let client = self.client.take().ok_or(RepositoryError::TransactionClosed)?;
        client.batch_execute("COMMIT").await?;
        Ok(())
    }
}

#[async_trait]
impl OrdersRepository for PgUnitOfWork {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO orders (
                uuid, track_id, customer_id, contact_name, contact_email, contact_phone,
                payment_method, subtotal, voucher_discount, delivery_fee, total, status,
                expired_at, voucher_id, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$15)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = self
            .client()?
            .query_one(
                &query,
                &[
                    &order.uuid,
                    &order.track_id,
                    &order.customer_id,
                    &order.contact.name,
                    &order.contact.email,
                    &order.contact.phone,
                    &order.payment_method,
                    &order.amounts.subtotal,
                    &order.amounts.voucher_discount,
                    &order.amounts.delivery_fee,
                    &order.amounts.total,
                    &PgOrderStatus::WaitingPayment,
                    &order.expired_at,
                    &order.voucher_id,
                    &order.created_at,
                ],
            )
            .await?;
        order_from_row(&row)
    }

    async fn find_order(&mut self, key: &OrderKey) -> Result<Option<Order>, RepositoryError> {
        let client = self.client()?;
        let row = match key {
            OrderKey::Id(id) => {
                let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
                client.query_opt(&query, &[id]).await?
            }
            OrderKey::Uuid(uuid) => {
                let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE uuid = $1 FOR UPDATE");
                client.query_opt(&query, &[uuid]).await?
            }
            OrderKey::TrackId(track_id) => {
                let query =
                    format!("SELECT {ORDER_COLUMNS} FROM orders WHERE track_id = $1 FOR UPDATE");
                client.query_opt(&query, &[track_id]).await?
            }
        };
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let status = filter.status.map(PgOrderStatus::from);
        let rows = self
            .client()?
            .query(&query, &[&status, &filter.limit, &filter.offset])
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let query = r#"
            UPDATE orders
            SET status = $2, expired_at = $3, technician_id = $4, driver_id = $5,
                scheduled_at = $6, updated_at = $7
            WHERE id = $1
        "#;
        let updated = self
            .client()?
            .execute(
                query,
                &[
                    &order.id,
                    &PgOrderStatus::from(order.status),
                    &order.expired_at,
                    &order.technician_id,
                    &order.driver_id,
                    &order.scheduled_at,
                    &order.updated_at,
                ],
            )
            .await?;
        match updated {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }

    async fn count_active_claims(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<i64, RepositoryError> {
        let query = r#"
            SELECT COUNT(*) AS claims FROM orders
            WHERE customer_id = $1 AND voucher_id = $2 AND status <> 'CANCELLED'
        "#;
        let row = self
            .client()?
            .query_one(query, &[&customer_id, &voucher_id])
            .await?;
        Ok(row.try_get("claims")?)
    }

    async fn overdue_orders_for_voucher(
        &mut self,
        voucher_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE voucher_id = $1 AND status = 'WAITING_PAYMENT' AND expired_at < $2
            ORDER BY id
            FOR UPDATE
            "#
        );
        let rows = self.client()?.query(&query, &[&voucher_id, &now]).await?;
        rows.iter().map(order_from_row).collect()
    }
}

#[async_trait]
impl ItemsRepository for PgUnitOfWork {
    async fn insert_order_products(
        &mut self,
        order_id: i64,
        products: &[NewOrderProduct],
    ) -> Result<Vec<OrderProduct>, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO order_products (
                order_id, product_id, bundle_id, variant_id, name, category, variant_name,
                bundle_members, unit_price, quantity, line_total, image_urls, device_id
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            RETURNING {ORDER_PRODUCT_COLUMNS}
            "#
        );
        let client = self.client()?;
        let mut stored = Vec::with_capacity(products.len());
        for p in products {
            let row = client
                .query_one(
                    &query,
                    &[
                        &order_id,
                        &p.product_id,
                        &p.bundle_id,
                        &p.variant_id,
                        &p.name,
                        &p.category,
                        &p.variant_name,
                        &p.bundle_members,
                        &p.unit_price,
                        &p.quantity,
                        &p.line_total,
                        &p.image_urls,
                        &p.device_id,
                    ],
                )
                .await?;
            stored.push(order_product_from_row(&row)?);
        }
        Ok(stored)
    }

    async fn order_products(&mut self, order_id: i64) -> Result<Vec<OrderProduct>, RepositoryError> {
        let query =
            format!("SELECT {ORDER_PRODUCT_COLUMNS} FROM order_products WHERE order_id = $1 ORDER BY id");
        let rows = self.client()?.query(&query, &[&order_id]).await?;
        rows.iter().map(order_product_from_row).collect()
    }

    async fn set_device_id(
        &mut self,
        order_product_id: i64,
        device_id: &str,
    ) -> Result<(), RepositoryError> {
        let updated = self
            .client()?
            .execute(
                "UPDATE order_products SET device_id = $2 WHERE id = $1",
                &[&order_product_id, &device_id],
            )
            .await?;
        match updated {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentsRepository for PgUnitOfWork {
    async fn insert_payment_reference(
        &mut self,
        order_id: i64,
        reference: &PaymentReference,
    ) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO payment_references (
                order_id, channel, external_id, reference_id, qr_reference_id,
                paylater_reference_id, retail_outlet_reference_id, provider_id,
                account_number, checkout_url, qr_string, payment_code
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        "#;
        self.client()?
            .execute(
                query,
                &[
                    &order_id,
                    &PgPaymentChannel::from(reference.channel),
                    &reference.reference_for(PaymentChannel::VirtualAccount),
                    &reference.reference_for(PaymentChannel::EWallet),
                    &reference.reference_for(PaymentChannel::QrCode),
                    &reference.reference_for(PaymentChannel::Paylater),
                    &reference.reference_for(PaymentChannel::RetailOutlet),
                    &reference.provider_id,
                    &reference.account_number,
                    &reference.checkout_url,
                    &reference.qr_string,
                    &reference.payment_code,
                ],
            )
            .await?;
        Ok(())
    }

    async fn payment_reference(
        &mut self,
        order_id: i64,
    ) -> Result<Option<PaymentReference>, RepositoryError> {
        let query = r#"
            SELECT channel, external_id, reference_id, qr_reference_id, paylater_reference_id,
                   retail_outlet_reference_id, provider_id, account_number, checkout_url,
                   qr_string, payment_code
            FROM payment_references WHERE order_id = $1
        "#;
        let row = self.client()?.query_opt(query, &[&order_id]).await?;
        row.as_ref().map(payment_reference_from_row).transpose()
    }

    async fn find_order_id_by_reference(
        &mut self,
        channel: PaymentChannel,
        reference: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        // The column name comes from a closed set, never from input.
        let query = format!(
            "SELECT order_id FROM payment_references WHERE {} = $1",
            channel.reference_field()
        );
        let row = self.client()?.query_opt(&query, &[&reference]).await?;
        Ok(row.map(|r| r.try_get("order_id")).transpose()?)
    }
}

#[async_trait]
impl VouchersRepository for PgUnitOfWork {
    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>, RepositoryError> {
        let query = r#"
            SELECT v.id, v.code, v.voucher_type, v.discount_amount, v.max_discount,
                   v.minimum_amount, v.quota, v.claim_limit_per_user, v.status,
                   v.starts_at, v.ends_at,
                   ARRAY(
                       SELECT vp.product_id FROM voucher_products vp
                       WHERE vp.voucher_id = v.id ORDER BY vp.product_id
                   ) AS product_ids
            FROM vouchers v WHERE v.code = $1
        "#;
        let row = self.client()?.query_opt(query, &[&code]).await?;
        row.as_ref().map(voucher_from_row).transpose()
    }

    async fn set_voucher_status(
        &mut self,
        voucher_id: i64,
        status: VoucherStatus,
    ) -> Result<(), RepositoryError> {
        self.client()?
            .execute(
                "UPDATE vouchers SET status = $2 WHERE id = $1",
                &[&voucher_id, &PgVoucherStatus::from(status)],
            )
            .await?;
        Ok(())
    }

    async fn consume_quota(&mut self, voucher_id: i64) -> Result<bool, RepositoryError> {
        let query = r#"
            UPDATE vouchers SET quota = quota - 1
            WHERE id = $1 AND (quota IS NULL OR quota > 0)
        "#;
        let updated = self.client()?.execute(query, &[&voucher_id]).await?;
        Ok(updated == 1)
    }

    async fn restore_quota(&mut self, voucher_id: i64) -> Result<(), RepositoryError> {
        self.client()?
            .execute(
                "UPDATE vouchers SET quota = quota + 1 WHERE id = $1 AND quota IS NOT NULL",
                &[&voucher_id],
            )
            .await?;
        Ok(())
    }

    async fn record_voucher_usage(
        &mut self,
        customer_id: i64,
        voucher_id: i64,
    ) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO customer_voucher_usages (customer_id, voucher_id, usage_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (customer_id, voucher_id)
            DO UPDATE SET usage_count = customer_voucher_usages.usage_count + 1
        "#;
        self.client()?
            .execute(query, &[&customer_id, &voucher_id])
            .await?;
        Ok(())
    }
}

/// Catalog lookups, one pooled connection per call.
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: Pool,
}

impl PgCatalogRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn products_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let client = self.pool.get().await?;

        let variant_rows = client
            .query(
                r#"
                SELECT id, product_id, name, regular_price, sale_price, stock
                FROM product_variants WHERE product_id = ANY($1) ORDER BY id
                "#,
                &[&ids],
            )
            .await?;
        let mut variants: HashMap<i64, Vec<ProductVariant>> = HashMap::new();
        for row in &variant_rows {
            variants
                .entry(row.try_get("product_id")?)
                .or_default()
                .push(ProductVariant {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    regular_price: row.try_get("regular_price")?,
                    sale_price: row.try_get("sale_price")?,
                    stock: row.try_get("stock")?,
                });
        }

        let rows = client
            .query(
                "SELECT id, name, category, image_urls, is_active FROM products WHERE id = ANY($1)",
                &[&ids],
            )
            .await?;
        let mut products = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            products.push(CatalogProduct {
                id,
                name: row.try_get("name")?,
                category: row.try_get("category")?,
                image_urls: row.try_get("image_urls")?,
                is_active: row.try_get("is_active")?,
                variants: variants.remove(&id).unwrap_or_default(),
            });
        }
        Ok(products)
    }

    async fn bundles_by_ids(&self, ids: &[i64]) -> Result<Vec<CatalogBundle>, RepositoryError> {
        let client = self.pool.get().await?;

        let member_rows = client
            .query(
                r#"
                SELECT bm.bundle_id, p.id AS product_id, p.name
                FROM bundle_members bm JOIN products p ON p.id = bm.product_id
                WHERE bm.bundle_id = ANY($1) ORDER BY bm.bundle_id, p.id
                "#,
                &[&ids],
            )
            .await?;
        let mut members: HashMap<i64, Vec<BundleMember>> = HashMap::new();
        for row in &member_rows {
            members
                .entry(row.try_get("bundle_id")?)
                .or_default()
                .push(BundleMember {
                    product_id: row.try_get("product_id")?,
                    name: row.try_get("name")?,
                });
        }

        let rows = client
            .query(
                "SELECT id, name, price, sale_price, image_urls, is_active FROM bundles WHERE id = ANY($1)",
                &[&ids],
            )
            .await?;
        let mut bundles = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            bundles.push(CatalogBundle {
                id,
                name: row.try_get("name")?,
                price: row.try_get("price")?,
                sale_price: row.try_get("sale_price")?,
                image_urls: row.try_get("image_urls")?,
                is_active: row.try_get("is_active")?,
                members: members.remove(&id).unwrap_or_default(),
            });
        }
        Ok(bundles)
    }
}

#[derive(Clone)]
pub struct PgCustomersRepository {
    pool: Pool,
}

impl PgCustomersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomersRepository for PgCustomersRepository {
    async fn customer_by_uuid(&self, uuid: Uuid) -> Result<Option<Customer>, RepositoryError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT id, uuid FROM customers WHERE uuid = $1", &[&uuid])
            .await?;
        match row {
            Some(row) => Ok(Some(Customer {
                id: row.try_get("id")?,
                uuid: row.try_get("uuid")?,
            })),
            None => Ok(None),
        }
    }
}
