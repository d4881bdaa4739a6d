#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use model::{
    CartLine, CatalogProduct, ContactInfo, CreateOrderRequest, Customer, NewOrder, OrderAmounts,
    ProductVariant, Voucher, VoucherStatus, VoucherType,
};
use notification::{LogNotifier, NotificationWorker};
use payment::{
    MockPaymentGateway, PaymentDispatcher, VirtualAccountRequest, VirtualAccountResponse,
};
use repository::{Database, MemoryDatabase, OrdersRepository, UnitOfWork, VouchersRepository};
use service::{ManualClock, OrderServiceImpl, OrderSettings};
use uuid::Uuid;

pub const CALLBACK_TOKEN: &str = "callback-secret";
pub const DELIVERY_FEE: i64 = 15_000;
pub const CUSTOMER_ID: i64 = 7;

pub type TestService = OrderServiceImpl<MemoryDatabase, MemoryDatabase, MemoryDatabase>;

pub struct Harness {
    pub db: MemoryDatabase,
    pub clock: Arc<ManualClock>,
    pub service: TestService,
    pub customer_uuid: Uuid,
    // Held so the notification queue stays open.
    _worker: NotificationWorker,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
}

pub fn va_response(req: &VirtualAccountRequest) -> VirtualAccountResponse {
    VirtualAccountResponse {
        id: format!("va-{}", req.external_id),
        external_id: req.external_id.clone(),
        account_number: "8808000000123".to_string(),
        bank_code: req.bank_code.clone(),
    }
}

/// Gateway that opens a virtual account named after the track id.
pub fn va_gateway() -> MockPaymentGateway {
    let mut gateway = MockPaymentGateway::new();
    gateway
        .expect_create_virtual_account()
        .returning(|req| Ok(va_response(req)));
    gateway
}

pub async fn harness(gateway: MockPaymentGateway) -> Harness {
    harness_on(MemoryDatabase::new(), gateway).await
}

/// Harness over a store the test keeps a handle to, e.g. inside gateway
/// closures.
pub async fn harness_on(db: MemoryDatabase, gateway: MockPaymentGateway) -> Harness {
    db.add_product(product(1, 100_000)).await;
    db.add_product(product(2, 40_000)).await;
    let customer_uuid = Uuid::new_v4();
    db.add_customer(Customer {
        id: CUSTOMER_ID,
        uuid: customer_uuid,
    })
    .await;

    let clock = Arc::new(ManualClock::new(start_time()));
    let (queue, worker) = notification::channel(16, Arc::new(LogNotifier));
    let dispatcher = PaymentDispatcher::new(Arc::new(gateway), "https://shop.test/paid");
    let settings = OrderSettings {
        order_expiry: Duration::hours(24),
        delivery_fee: DELIVERY_FEE,
    };

    let service = OrderServiceImpl::new(
        db.clone(),
        db.clone(),
        db.clone(),
        dispatcher,
        queue,
        clock.clone(),
        settings,
        CALLBACK_TOKEN,
    );

    Harness {
        db,
        clock,
        service,
        customer_uuid,
        _worker: worker,
    }
}

pub fn product(id: i64, price: i64) -> CatalogProduct {
    CatalogProduct {
        id,
        name: format!("Product {id}"),
        category: "AC Service".to_string(),
        image_urls: Vec::new(),
        is_active: true,
        variants: vec![ProductVariant {
            id: id * 10,
            name: "Standard".to_string(),
            regular_price: Some(price),
            sale_price: None,
            stock: None,
        }],
    }
}

pub fn voucher(id: i64, code: &str, voucher_type: VoucherType, discount_amount: i64) -> Voucher {
    Voucher {
        id,
        code: code.to_string(),
        voucher_type,
        discount_amount,
        max_discount: None,
        minimum_amount: None,
        quota: Some(5),
        claim_limit_per_user: None,
        status: VoucherStatus::OnGoing,
        starts_at: start_time() - Duration::days(1),
        ends_at: start_time() + Duration::days(30),
        product_ids: Vec::new(),
    }
}

pub fn line(product_id: i64, quantity: i32) -> CartLine {
    CartLine::Product {
        product_id,
        variant_id: Some(product_id * 10),
        quantity,
        device_id: None,
    }
}

/// A request whose money fields are already what the server computes.
pub fn request(
    lines: Vec<CartLine>,
    subtotal: i64,
    voucher: Option<(&str, i64)>,
) -> CreateOrderRequest {
    let (voucher_code, voucher_discount) = match voucher {
        Some((code, discount)) => (Some(code.to_string()), discount),
        None => (None, 0),
    };
    CreateOrderRequest {
        customer_uuid: None,
        contact: ContactInfo {
            name: "Budi".to_string(),
            email: "budi@example.com".to_string(),
            phone: "+6281234567890".to_string(),
        },
        payment_method: "BCA".to_string(),
        voucher_code,
        lines,
        subtotal,
        voucher_discount,
        delivery_fee: DELIVERY_FEE,
        total: subtotal - voucher_discount + DELIVERY_FEE,
    }
}

/// Virtual account payment callback for `track_id`.
pub fn va_callback(track_id: &str, amount: i64) -> Vec<u8> {
    serde_json::json!({
        "payment_id": format!("pay-{track_id}"),
        "callback_virtual_account_id": format!("va-{track_id}"),
        "external_id": track_id,
        "bank_code": "BCA",
        "amount": amount,
    })
    .to_string()
    .into_bytes()
}

/// Runs `work` in its own committed transaction from synchronous code, such
/// as a mock gateway closure. Needs a multi-threaded runtime.
pub fn commit_blocking<F>(db: &MemoryDatabase, work: F)
where
    F: for<'a> FnOnce(
        &'a mut dyn UnitOfWork,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>,
{
    tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(async {
            let mut tx = db.begin().await.unwrap();
            work(&mut *tx).await;
            tx.commit().await.unwrap();
        })
    });
}

/// Takes every remaining unit of the voucher's quota.
pub fn drain_quota(db: &MemoryDatabase, voucher_id: i64) {
    commit_blocking(db, move |tx| {
        Box::pin(async move { while tx.consume_quota(voucher_id).await.unwrap() {} })
    });
}

/// Stores another checkout of the test customer against the voucher, the way
/// a concurrent request would.
pub fn store_competing_checkout(db: &MemoryDatabase, track_id: &str, voucher_id: i64) {
    let order = NewOrder {
        uuid: Uuid::new_v4(),
        track_id: track_id.to_string(),
        customer_id: Some(CUSTOMER_ID),
        contact: ContactInfo::default(),
        payment_method: "BCA".to_string(),
        amounts: OrderAmounts {
            subtotal: 100_000,
            voucher_discount: 10_000,
            delivery_fee: DELIVERY_FEE,
            total: 100_000 - 10_000 + DELIVERY_FEE,
        },
        voucher_id: Some(voucher_id),
        expired_at: start_time() + Duration::hours(24),
        created_at: start_time(),
    };
    commit_blocking(db, move |tx| {
        Box::pin(async move {
            assert!(tx.consume_quota(voucher_id).await.unwrap());
            tx.insert_order(&order).await.unwrap();
        })
    });
}
