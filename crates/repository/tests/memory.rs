use chrono::{Duration, TimeZone, Utc};
use model::{
    ContactInfo, NewOrder, OrderAmounts, OrderFilter, OrderKey, OrderStatus, PaymentChannel,
    PaymentReference, ProductSnapshot, Voucher, VoucherStatus, VoucherType,
};
use repository::{
    Database, ItemsRepository, MemoryDatabase, OrdersRepository, PaymentsRepository,
    UnitOfWork, VouchersRepository,
};
use testresult::TestResult;
use uuid::Uuid;

fn voucher(quota: Option<i32>) -> Voucher {
    Voucher {
        id: 7,
        code: "HEMAT10".to_string(),
        voucher_type: VoucherType::Fixed,
        discount_amount: 10_000,
        max_discount: None,
        minimum_amount: None,
        quota,
        claim_limit_per_user: Some(1),
        status: VoucherStatus::OnGoing,
        starts_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ends_at: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
        product_ids: Vec::new(),
    }
}

fn new_order(track_id: &str, minutes_ago: i64) -> NewOrder {
    let created_at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap() - Duration::minutes(minutes_ago);
    NewOrder {
        uuid: Uuid::new_v4(),
        track_id: track_id.to_string(),
        customer_id: Some(1),
        contact: ContactInfo::default(),
        payment_method: "BCA".to_string(),
        amounts: OrderAmounts {
            subtotal: 100_000,
            voucher_discount: 10_000,
            delivery_fee: 0,
            total: 90_000,
        },
        voucher_id: Some(7),
        expired_at: created_at + Duration::hours(24),
        created_at,
    }
}

fn snapshot() -> ProductSnapshot {
    ProductSnapshot {
        product_id: Some(1),
        bundle_id: None,
        variant_id: Some(10),
        name: "Deep Cleaning".to_string(),
        category: Some("Cleaning".to_string()),
        variant_name: Some("Standard".to_string()),
        bundle_members: Vec::new(),
        unit_price: 50_000,
        quantity: 2,
        line_total: 100_000,
        image_urls: Vec::new(),
        device_id: None,
    }
}

#[tokio::test]
async fn test_committed_unit_of_work_is_visible() -> TestResult {
    let db = MemoryDatabase::new();

    let mut tx = db.begin().await?;
    let order = tx.insert_order(&new_order("ORD-20261016-AAAAAA", 0)).await?;
    tx.insert_order_products(order.id, &[snapshot()]).await?;
    tx.insert_payment_reference(order.id, &PaymentReference::new(PaymentChannel::VirtualAccount, &order.track_id))
        .await?;
    tx.commit().await?;

    let mut tx = db.begin().await?;
    let found = tx.find_order(&OrderKey::TrackId(order.track_id.clone())).await?;
    assert_eq!(found.as_ref().map(|o| o.status), Some(OrderStatus::WaitingPayment));
    assert_eq!(tx.order_products(order.id).await?.len(), 1);
    assert_eq!(
        tx.find_order_id_by_reference(PaymentChannel::VirtualAccount, &order.track_id)
            .await?,
        Some(order.id)
    );
    assert_eq!(
        tx.find_order_id_by_reference(PaymentChannel::EWallet, &order.track_id)
            .await?,
        None
    );
    Ok(())
}

#[tokio::test]
async fn test_dropped_unit_of_work_rolls_back() -> TestResult {
    let db = MemoryDatabase::new();
    db.add_voucher(voucher(Some(3))).await;

    {
        let mut tx = db.begin().await?;
        tx.insert_order(&new_order("ORD-20261016-BBBBBB", 0)).await?;
        assert!(tx.consume_quota(7).await?);
    }

    assert_eq!(db.order_count().await, 0);
    assert_eq!(db.voucher(7).await.and_then(|v| v.quota), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_quota_consume_and_restore() -> TestResult {
    let db = MemoryDatabase::new();
    db.add_voucher(voucher(Some(1))).await;

    let mut tx = db.begin().await?;
    assert!(tx.consume_quota(7).await?);
    assert!(!tx.consume_quota(7).await?);
    tx.restore_quota(7).await?;
    assert!(tx.consume_quota(7).await?);
    tx.commit().await?;

    assert_eq!(db.voucher(7).await.and_then(|v| v.quota), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_unlimited_quota_is_never_exhausted() -> TestResult {
    let db = MemoryDatabase::new();
    db.add_voucher(voucher(None)).await;

    let mut tx = db.begin().await?;
    for _ in 0..5 {
        assert!(tx.consume_quota(7).await?);
    }
    tx.restore_quota(7).await?;
    tx.commit().await?;

    assert_eq!(db.voucher(7).await.and_then(|v| v.quota), None);
    Ok(())
}

#[tokio::test]
async fn test_claims_ignore_cancelled_orders() -> TestResult {
    let db = MemoryDatabase::new();
    let mut tx = db.begin().await?;

    let mut first = tx.insert_order(&new_order("ORD-20261016-CCCCCC", 10)).await?;
    tx.insert_order(&new_order("ORD-20261016-DDDDDD", 5)).await?;
    assert_eq!(tx.count_active_claims(1, 7).await?, 2);

    first.status = OrderStatus::Cancelled;
    first.expired_at = None;
    tx.update_order(&first).await?;
    assert_eq!(tx.count_active_claims(1, 7).await?, 1);
    assert_eq!(tx.count_active_claims(2, 7).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_list_is_newest_first_and_filtered() -> TestResult {
    let db = MemoryDatabase::new();
    let mut tx = db.begin().await?;

    let mut oldest = tx.insert_order(&new_order("ORD-20261016-EEEEEE", 30)).await?;
    tx.insert_order(&new_order("ORD-20261016-FFFFFF", 20)).await?;
    tx.insert_order(&new_order("ORD-20261016-GGGGGG", 10)).await?;
    oldest.status = OrderStatus::Cancelled;
    tx.update_order(&oldest).await?;

    let all = tx.list_orders(&OrderFilter::default()).await?;
    let tracks: Vec<_> = all.iter().map(|o| o.track_id.as_str()).collect();
    assert_eq!(
        tracks,
        ["ORD-20261016-GGGGGG", "ORD-20261016-FFFFFF", "ORD-20261016-EEEEEE"]
    );

    let waiting = tx
        .list_orders(&OrderFilter {
            status: Some(OrderStatus::WaitingPayment),
            limit: 1,
            offset: 1,
        })
        .await?;
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].track_id, "ORD-20261016-FFFFFF");
    Ok(())
}

#[tokio::test]
async fn test_voucher_usage_upserts() -> TestResult {
    let db = MemoryDatabase::new();
    assert_eq!(db.voucher_usage(1, 7).await, 0);

    let mut tx = db.begin().await?;
    tx.record_voucher_usage(1, 7).await?;
    tx.record_voucher_usage(1, 7).await?;
    tx.commit().await?;
    assert_eq!(db.voucher_usage(1, 7).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_overdue_orders_for_voucher() -> TestResult {
    let db = MemoryDatabase::new();
    let mut tx = db.begin().await?;

    let overdue = tx.insert_order(&new_order("ORD-20261016-JJJJJJ", 10)).await?;
    let mut cancelled = tx.insert_order(&new_order("ORD-20261016-KKKKKK", 20)).await?;
    tx.insert_order(&new_order("ORD-20261016-LLLLLL", 0)).await?;
    let mut other_voucher = new_order("ORD-20261016-MMMMMM", 30);
    other_voucher.voucher_id = Some(8);
    tx.insert_order(&other_voucher).await?;

    cancelled.status = OrderStatus::Cancelled;
    cancelled.expired_at = None;
    tx.update_order(&cancelled).await?;

    // The order placed exactly at the base time expires at `now`, not before it.
    let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
    let found = tx.overdue_orders_for_voucher(7, now).await?;
    let ids: Vec<_> = found.iter().map(|o| o.id).collect();
    assert_eq!(ids, [overdue.id]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_reference_is_rejected() -> TestResult {
    let db = MemoryDatabase::new();
    let mut tx = db.begin().await?;

    let a = tx.insert_order(&new_order("ORD-20261016-HHHHHH", 0)).await?;
    let b = tx.insert_order(&new_order("ORD-20261016-IIIIII", 0)).await?;
    let reference = PaymentReference::new(PaymentChannel::QrCode, "qr_1");

    tx.insert_payment_reference(a.id, &reference).await?;
    assert!(tx.insert_payment_reference(b.id, &reference).await.is_err());
    Ok(())
}
