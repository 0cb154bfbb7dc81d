use chrono::{Duration, TimeZone, Utc};
use pgstay_billing::{
    BillingRunSummary, EffectQueue, ManualPayment, OnboardTenant, WebhookOutcome, apply_webhook,
    confirm_admission, offboard, onboard, payment_history, record_manual_payment,
    reference::payment_reference, run_billing_cycle,
};
use pgstay_core::{
    BillingError, ErrorKind, KycDetails, PaymentMethod, PaymentType, Room, TenancyStore,
    TenantStatus,
};
use pgstay_memstore::{FailPoint, InMemoryTenancyStore};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

async fn store_with_room() -> (InMemoryTenancyStore, Room) {
    let store = InMemoryTenancyStore::new();
    let room = Room {
        id: Uuid::new_v4(),
        property_id: Uuid::new_v4(),
        room_no: "101".to_string(),
        capacity: 2,
        price: Decimal::from(5000),
        deposit: Decimal::from(2000),
    };
    store.insert_room(room.clone()).await;
    (store, room)
}

async fn admit(
    store: &InMemoryTenancyStore,
    effects: &EffectQueue,
    room: &Room,
    phone: &str,
) -> Uuid {
    let admitted_at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
    let onboarded = onboard(
        store,
        effects,
        OnboardTenant {
            room_id: room.id,
            name: "Priya Nair".to_string(),
            phone: phone.to_string(),
            monthly_rent: Some(Decimal::from(5000)),
            admission_date: Some(admitted_at),
            details: KycDetails {
                father_name: "Mohan Nair".to_string(),
                permanent_address: "12 Lake Road, Kochi".to_string(),
                ..KycDetails::default()
            },
        },
        admitted_at,
    )
    .await
    .unwrap();

    let otp = store
        .profile(onboarded.identity_id)
        .await
        .unwrap()
        .and_then(|profile| profile.otp)
        .unwrap();
    confirm_admission(store, effects, onboarded.identity_id, &otp, admitted_at)
        .await
        .unwrap();

    onboarded.identity_id
}

#[tokio::test]
async fn test_full_tenancy_lifecycle() {
    let (store, room) = store_with_room().await;
    let (effects, _receiver) = EffectQueue::bounded(64);
    let identity_id = admit(&store, &effects, &room, "9811111111").await;

    let profile = store.profile(identity_id).await.unwrap().unwrap();
    assert_eq!(profile.status, TenantStatus::Active);
    assert_eq!(profile.balance, Decimal::from(7000));
    let first_due = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
    assert_eq!(profile.next_billing_date, first_due);

    let paid = record_manual_payment(
        &store,
        &effects,
        ManualPayment {
            identity_id,
            amount: Decimal::from(3000),
            method: PaymentMethod::Cash,
        },
        Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(paid.balance_after, Decimal::from(4000));
    let payments = store.payments_for(identity_id).await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].payment_type, PaymentType::ManualPayment);

    let early = run_billing_cycle(&store, &effects, first_due - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(early, BillingRunSummary::default());

    let summary = run_billing_cycle(&store, &effects, first_due).await.unwrap();
    assert_eq!(summary.billed, 1);
    let profile = store.profile(identity_id).await.unwrap().unwrap();
    assert_eq!(profile.balance, Decimal::from(9000));
    assert_eq!(profile.next_billing_date, first_due + Duration::days(30));

    let err = offboard(&store, identity_id, first_due).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutstandingBalance);
    assert_eq!(err.to_string(), "outstanding balance: 9000.00");

    let settled = record_manual_payment(
        &store,
        &effects,
        ManualPayment {
            identity_id,
            amount: Decimal::from(9000),
            method: PaymentMethod::Upi,
        },
        first_due + Duration::days(1),
    )
    .await
    .unwrap();
    assert_eq!(settled.balance_after, Decimal::ZERO);

    let checkout = first_due + Duration::days(2);
    let archive = offboard(&store, identity_id, checkout).await.unwrap();
    assert_eq!(archive.checkout_date, checkout);
    assert_eq!(archive.father_name, "Mohan Nair");
    assert_eq!(store.archive_for(identity_id).await.len(), 1);
    assert!(store.profile(identity_id).await.unwrap().is_none());
    assert!(store.identity(identity_id).await.is_none());

    let history = payment_history(&store).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].payment.amount, Decimal::from(9000));
    assert!(history.iter().all(|view| view.tenant_name == "Priya Nair"));
}

#[tokio::test]
async fn test_webhook_redelivery_applies_once() {
    let (store, room) = store_with_room().await;
    let (effects, _receiver) = EffectQueue::bounded(64);
    let identity_id = admit(&store, &effects, &room, "9822222222").await;
    let now = Utc.with_ymd_and_hms(2026, 4, 3, 8, 0, 0).unwrap();
    let payload = json!({
        "event": "payment_link.paid",
        "payload": {
            "payment_link": {
                "entity": {
                    "id": "plink_Q1",
                    "amount": 700000,
                    "reference_id": payment_reference(identity_id, now)
                }
            },
            "payment": { "entity": { "id": "pay_Q1" } }
        }
    });

    let first = apply_webhook(&store, &effects, &payload, now).await.unwrap();
    let second = apply_webhook(&store, &effects, &payload, now).await.unwrap();

    match first {
        WebhookOutcome::Applied(reconciled) => {
            assert_eq!(reconciled.balance_after, Decimal::ZERO);
            assert_eq!(reconciled.payment.payment_type, PaymentType::RentPayment);
            assert_eq!(reconciled.payment.method, PaymentMethod::Razorpay);
        }
        other => panic!("expected applied, got {other:?}"),
    }
    assert!(matches!(second, WebhookOutcome::Duplicate { ref event_key } if event_key == "pay_Q1"));
    let profile = store.profile(identity_id).await.unwrap().unwrap();
    assert_eq!(profile.balance, Decimal::ZERO);
    assert_eq!(store.payments_for(identity_id).await.len(), 1);
}

#[tokio::test]
async fn test_failed_webhook_settlement_can_be_redelivered() {
    let (store, room) = store_with_room().await;
    let (effects, mut receiver) = EffectQueue::bounded(64);
    let identity_id = admit(&store, &effects, &room, "9844444444").await;
    while receiver.try_next().is_some() {}
    let now = Utc.with_ymd_and_hms(2026, 4, 4, 10, 0, 0).unwrap();
    let payload = json!({
        "event": "payment_link.paid",
        "payload": {
            "payment_link": {
                "entity": {
                    "id": "plink_R7",
                    "amount": 300000,
                    "reference_id": payment_reference(identity_id, now)
                }
            },
            "payment": { "entity": { "id": "pay_R7" } }
        }
    });
    store.fail_on(FailPoint::InsertPayment);

    let err = apply_webhook(&store, &effects, &payload, now)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    let profile = store.profile(identity_id).await.unwrap().unwrap();
    assert_eq!(profile.balance, Decimal::from(7000));
    assert!(store.payments_for(identity_id).await.is_empty());
    assert!(receiver.try_next().is_none());

    let retried = apply_webhook(&store, &effects, &payload, now).await.unwrap();

    match retried {
        WebhookOutcome::Applied(reconciled) => {
            assert_eq!(reconciled.balance_before, Decimal::from(7000));
            assert_eq!(reconciled.balance_after, Decimal::from(4000));
        }
        other => panic!("expected applied, got {other:?}"),
    }
    assert_eq!(store.payments_for(identity_id).await.len(), 1);
    let again = apply_webhook(&store, &effects, &payload, now).await.unwrap();
    assert!(matches!(again, WebhookOutcome::Duplicate { .. }));
}

#[tokio::test]
async fn test_webhook_for_unknown_tenant_changes_nothing() {
    let (store, _room) = store_with_room().await;
    let (effects, _receiver) = EffectQueue::bounded(8);
    let now = Utc::now();
    let payload = json!({
        "event": "payment_link.paid",
        "payload": {
            "payment_link": {
                "entity": {
                    "amount": 1000,
                    "reference_id": payment_reference(Uuid::new_v4(), now)
                }
            }
        }
    });

    let err = apply_webhook(&store, &effects, &payload, now)
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::TenantNotFound(_)));
    assert!(store.payments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_payments_both_land() {
    let (store, room) = store_with_room().await;
    let (effects, _receiver) = EffectQueue::bounded(64);
    let identity_id = admit(&store, &effects, &room, "9833333333").await;
    let now = Utc.with_ymd_and_hms(2026, 4, 5, 12, 0, 0).unwrap();
    let (store_ref, effects_ref) = (&store, &effects);
    let pay = move |amount: i64, method: PaymentMethod| {
        record_manual_payment(
            store_ref,
            effects_ref,
            ManualPayment {
                identity_id,
                amount: Decimal::from(amount),
                method,
            },
            now,
        )
    };

    let (first, second) = tokio::join!(
        pay(2500, PaymentMethod::Cash),
        pay(1500, PaymentMethod::Bank)
    );
    first.unwrap();
    second.unwrap();

    let profile = store.profile(identity_id).await.unwrap().unwrap();
    assert_eq!(profile.balance, Decimal::from(3000));
    assert_eq!(store.payments_for(identity_id).await.len(), 2);
}
