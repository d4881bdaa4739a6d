mod common;

use chrono::Duration;
use common::*;
use model::{
    AdvanceOrderRequest, DeviceIdUpdate, OrderFilter, OrderStatus, PaymentChannel, VoucherType,
};
use payment::{GatewayError, MockPaymentGateway};
use pricing::VoucherRejection;
use repository::MemoryDatabase;
use service::{ErrorKind, OrderService, PaymentWebhookService, ServiceError};
use testresult::TestResult;

#[tokio::test]
async fn test_create_order_prices_cart_and_persists_everything() -> TestResult {
    let h = harness(va_gateway()).await;

    let details = h
        .service
        .create_order(&request(vec![line(1, 2), line(2, 1)], 240_000, None))
        .await?;

    assert_eq!(details.order.amounts.subtotal, 240_000);
    assert_eq!(details.order.amounts.delivery_fee, DELIVERY_FEE);
    assert_eq!(details.order.amounts.total, 255_000);
    assert_eq!(details.order.status, OrderStatus::WaitingPayment);
    assert_eq!(
        details.order.expired_at,
        Some(start_time() + Duration::hours(24))
    );
    assert!(details.order.track_id.starts_with("ORD-20261016-"));
    assert_eq!(details.products.len(), 2);

    let payment = details.payment.as_ref().unwrap();
    assert_eq!(payment.channel, PaymentChannel::VirtualAccount);
    assert_eq!(payment.reference, details.order.track_id);
    assert_eq!(payment.account_number.as_deref(), Some("8808000000123"));

    assert_eq!(h.db.order_count().await, 1);
    assert_eq!(h.db.payment_reference_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_reads_by_every_key_agree() -> TestResult {
    let h = harness(va_gateway()).await;
    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;

    let by_id = h.service.get_order_by_id(created.order.id).await?;
    let by_uuid = h.service.get_order_by_uuid(created.order.uuid).await?;
    let by_track = h
        .service
        .get_order_by_track_id(&created.order.track_id)
        .await?;
    let listed = h.service.list_orders(&OrderFilter::default()).await?;

    assert_eq!(by_id, created);
    assert_eq!(by_uuid, created);
    assert_eq!(by_track, created);
    assert_eq!(listed, vec![created.order]);
    Ok(())
}

#[tokio::test]
async fn test_tampered_total_is_rejected_before_payment() -> TestResult {
    // No gateway expectations: any provider call would panic.
    let h = harness(MockPaymentGateway::new()).await;
    let mut req = request(vec![line(1, 1)], 100_000, None);
    req.total -= 1;

    let err = h.service.create_order(&req).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::AmountMismatch {
            field: "total",
            computed: 115_000,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.db.order_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_payment_method_is_a_validation_error() -> TestResult {
    let h = harness(MockPaymentGateway::new()).await;
    let mut req = request(vec![line(1, 1)], 100_000, None);
    req.payment_method = "CASH".to_string();

    let err = h.service.create_order(&req).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.db.order_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_fixed_voucher_is_capped_at_subtotal() -> TestResult {
    let h = harness(va_gateway()).await;
    h.db
        .add_voucher(voucher(1, "BIGCUT", VoucherType::Fixed, 500_000))
        .await;

    let details = h
        .service
        .create_order(&request(vec![line(2, 1)], 40_000, Some(("BIGCUT", 40_000))))
        .await?;

    assert_eq!(details.order.amounts.voucher_discount, 40_000);
    assert_eq!(details.order.amounts.total, DELIVERY_FEE);
    assert_eq!(details.order.voucher_id, Some(1));
    assert_eq!(h.db.voucher(1).await.unwrap().quota, Some(4));
    Ok(())
}

#[tokio::test]
async fn test_percentage_voucher_respects_max_discount() -> TestResult {
    let h = harness(va_gateway()).await;
    let mut v = voucher(2, "HALF", VoucherType::Percentage, 50);
    v.max_discount = Some(30_000);
    h.db.add_voucher(v).await;

    let details = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, Some(("HALF", 30_000))))
        .await?;

    assert_eq!(details.order.amounts.voucher_discount, 30_000);
    assert_eq!(details.order.amounts.total, 85_000);
    Ok(())
}

#[tokio::test]
async fn test_unknown_voucher_is_not_found() -> TestResult {
    let h = harness(MockPaymentGateway::new()).await;

    let err = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, Some(("NOPE", 0))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_claim_limit_ignores_cancelled_orders() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    let mut v = voucher(3, "ONCE", VoucherType::Fixed, 10_000);
    v.claim_limit_per_user = Some(1);
    h.db.add_voucher(v).await;

    let mut req = request(vec![line(1, 1)], 100_000, Some(("ONCE", 10_000)));
    req.customer_uuid = Some(h.customer_uuid);

    let first = h.service.create_order(&req).await?;

    let err = h.service.create_order(&req).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Voucher(VoucherRejection::ClaimLimitReached { claimed: 1, limit: 1 })
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let cancelled = h.service.cancel_order(&first.order.track_id).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    h.service.create_order(&req).await?;
    Ok(())
}

#[tokio::test]
async fn test_quota_held_by_unread_overdue_order_is_released_at_checkout() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    let mut v = voucher(8, "LAST", VoucherType::Fixed, 10_000);
    v.quota = Some(1);
    h.db.add_voucher(v).await;
    let req = request(vec![line(1, 1)], 100_000, Some(("LAST", 10_000)));

    let first = h.service.create_order(&req).await?;
    assert_eq!(h.db.voucher(8).await.unwrap().quota, Some(0));
    h.clock.advance(Duration::hours(25));

    let second = h.service.create_order(&req).await?;

    assert_eq!(second.order.voucher_id, Some(8));
    assert_eq!(h.db.voucher(8).await.unwrap().quota, Some(0));
    let stored = h.service.get_order_by_id(first.order.id).await?;
    assert_eq!(stored.order.status, OrderStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_claim_held_by_unread_overdue_order_is_released_at_checkout() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    let mut v = voucher(9, "ONCE", VoucherType::Fixed, 10_000);
    v.claim_limit_per_user = Some(1);
    h.db.add_voucher(v).await;
    let mut req = request(vec![line(1, 1)], 100_000, Some(("ONCE", 10_000)));
    req.customer_uuid = Some(h.customer_uuid);

    let first = h.service.create_order(&req).await?;
    h.clock.advance(Duration::hours(25));

    h.service.create_order(&req).await?;

    let stored = h.service.get_order_by_id(first.order.id).await?;
    assert_eq!(stored.order.status, OrderStatus::Cancelled);
    assert_eq!(h.db.voucher(9).await.unwrap().quota, Some(4));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_claim_limit_is_rechecked_when_storing_the_order() -> TestResult {
    let db = MemoryDatabase::new();
    let mut gateway = MockPaymentGateway::new();
    let racing = db.clone();
    gateway
        .expect_create_virtual_account()
        .times(1)
        .returning(move |req| {
            store_competing_checkout(&racing, "ORD-20261016-RACE01", 10);
            Ok(va_response(req))
        });
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness_on(db, gateway).await;
    let mut v = voucher(10, "ONCE", VoucherType::Fixed, 10_000);
    v.claim_limit_per_user = Some(1);
    h.db.add_voucher(v).await;
    let mut req = request(vec![line(1, 1)], 100_000, Some(("ONCE", 10_000)));
    req.customer_uuid = Some(h.customer_uuid);

    let err = h.service.create_order(&req).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Voucher(VoucherRejection::ClaimLimitReached { claimed: 1, limit: 1 })
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.db.order_count().await, 1);
    assert_eq!(h.db.payment_reference_count().await, 0);
    assert_eq!(h.db.voucher(10).await.unwrap().quota, Some(4));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quota_exhausted_while_payment_opens_stores_nothing() -> TestResult {
    let db = MemoryDatabase::new();
    let mut gateway = MockPaymentGateway::new();
    let racing = db.clone();
    gateway
        .expect_create_virtual_account()
        .times(1)
        .returning(move |req| {
            drain_quota(&racing, 11);
            Ok(va_response(req))
        });
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness_on(db, gateway).await;
    let mut v = voucher(11, "LAST", VoucherType::Fixed, 10_000);
    v.quota = Some(1);
    h.db.add_voucher(v).await;

    let err = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, Some(("LAST", 10_000))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.db.order_count().await, 0);
    assert_eq!(h.db.payment_reference_count().await, 0);
    assert_eq!(h.db.voucher(11).await.unwrap().quota, Some(0));
    Ok(())
}

#[tokio::test]
async fn test_gateway_failure_persists_nothing() -> TestResult {
    let mut gateway = MockPaymentGateway::new();
    gateway
        .expect_create_virtual_account()
        .times(1)
        .returning(|_| Err(GatewayError::Timeout));
    let h = harness(gateway).await;
    h.db
        .add_voucher(voucher(4, "HEMAT", VoucherType::Fixed, 5_000))
        .await;

    let err = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, Some(("HEMAT", 5_000))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalGateway);
    assert_eq!(h.db.order_count().await, 0);
    assert_eq!(h.db.payment_reference_count().await, 0);
    assert_eq!(h.db.voucher(4).await.unwrap().quota, Some(5));
    Ok(())
}

#[tokio::test]
async fn test_lazy_expiry_restores_quota_exactly_once() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    h.db
        .add_voucher(voucher(5, "HEMAT", VoucherType::Fixed, 5_000))
        .await;

    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, Some(("HEMAT", 5_000))))
        .await?;
    assert_eq!(h.db.voucher(5).await.unwrap().quota, Some(4));

    h.clock.advance(Duration::hours(25));

    let expired = h
        .service
        .get_order_by_track_id(&created.order.track_id)
        .await?;
    assert_eq!(expired.order.status, OrderStatus::Cancelled);
    assert_eq!(expired.order.expired_at, None);
    assert_eq!(h.db.voucher(5).await.unwrap().quota, Some(5));

    let again = h.service.get_order_by_id(created.order.id).await?;
    assert_eq!(again.order.status, OrderStatus::Cancelled);
    assert_eq!(h.db.voucher(5).await.unwrap().quota, Some(5));
    Ok(())
}

#[tokio::test]
async fn test_list_expires_overdue_orders() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .returning(|_| Ok(()));
    let h = harness(gateway).await;

    h.service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;
    h.clock.advance(Duration::hours(30));
    let fresh = h
        .service
        .create_order(&request(vec![line(2, 1)], 40_000, None))
        .await?;

    let waiting = h
        .service
        .list_orders(&OrderFilter {
            status: Some(OrderStatus::WaitingPayment),
            ..OrderFilter::default()
        })
        .await?;
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].id, fresh.order.id);

    let all = h.service.list_orders(&OrderFilter::default()).await?;
    assert_eq!(all[0].id, fresh.order.id);
    assert_eq!(all[0].status, OrderStatus::WaitingPayment);
    assert_eq!(all[1].status, OrderStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_cancel_twice_conflicts() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;

    h.service.cancel_order(&created.order.track_id).await?;
    let err = h
        .service
        .cancel_order(&created.order.track_id)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    Ok(())
}

#[tokio::test]
async fn test_cancel_overdue_order_reports_expiry() -> TestResult {
    let mut gateway = va_gateway();
    gateway
        .expect_invalidate_virtual_account()
        .returning(|_| Ok(()));
    let h = harness(gateway).await;
    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;
    h.clock.advance(Duration::hours(48));

    let err = h
        .service
        .cancel_order(&created.order.track_id)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(ref msg) if msg.contains("expired")));
    let stored = h.service.get_order_by_id(created.order.id).await?;
    assert_eq!(stored.order.status, OrderStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_advance_through_fulfilment() -> TestResult {
    let h = harness(va_gateway()).await;
    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;
    h.service
        .handle_provider_webhook(
            Some(CALLBACK_TOKEN),
            &va_callback(&created.order.track_id, 115_000),
        )
        .await?;

    let product_id = created.products[0].id;
    let packed = h
        .service
        .advance_order_status(
            created.order.uuid,
            &AdvanceOrderRequest {
                status: OrderStatus::Packed,
                technician_id: Some(11),
                driver_id: None,
                scheduled_at: None,
                device_ids: vec![DeviceIdUpdate {
                    order_product_id: product_id,
                    device_id: "AC-0042".to_string(),
                }],
            },
        )
        .await?;

    assert_eq!(packed.order.status, OrderStatus::Packed);
    assert_eq!(packed.order.technician_id, Some(11));
    assert_eq!(
        packed.products[0].snapshot.device_id.as_deref(),
        Some("AC-0042")
    );

    let err = h
        .service
        .advance_order_status(
            created.order.uuid,
            &AdvanceOrderRequest {
                status: OrderStatus::Delivered,
                technician_id: None,
                driver_id: None,
                scheduled_at: None,
                device_ids: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    Ok(())
}

#[tokio::test]
async fn test_advance_rejects_foreign_order_product() -> TestResult {
    let h = harness(va_gateway()).await;
    let created = h
        .service
        .create_order(&request(vec![line(1, 1)], 100_000, None))
        .await?;

    let err = h
        .service
        .advance_order_status(
            created.order.uuid,
            &AdvanceOrderRequest {
                status: OrderStatus::OnProgress,
                technician_id: None,
                driver_id: None,
                scheduled_at: None,
                device_ids: vec![DeviceIdUpdate {
                    order_product_id: 9_999,
                    device_id: "AC-1".to_string(),
                }],
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let stored = h.service.get_order_by_id(created.order.id).await?;
    assert_eq!(stored.order.status, OrderStatus::WaitingPayment);
    Ok(())
}
