use chrono::{DateTime, Utc};
use pgstay_core::{
    BillingError, BillingResult, Payment, PaymentMethod, PaymentType, TenancyStore, TenancyTx,
    TenantProfile,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    effects::{EffectQueue, ReceiptRequest, SideEffect},
    ledger,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPayment {
    pub identity_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciled {
    pub payment: Payment,
    pub tenant_name: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

/// Owner-entered payment. Overpayment is allowed and leaves the tenant in credit.
pub async fn record_manual_payment<S: TenancyStore>(
    store: &S,
    effects: &EffectQueue,
    request: ManualPayment,
    now: DateTime<Utc>,
) -> BillingResult<Reconciled> {
    ledger::checked_amount(request.amount)?;

    let mut tx = store.begin().await?;
    let profile = tx
        .lock_profile(request.identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(request.identity_id))?;

    let reconciled = reconcile(
        &mut tx,
        &profile,
        request.amount,
        PaymentType::ManualPayment,
        request.method,
        now,
    )
    .await?;

    tx.commit().await?;

    info!(
        identity_id = %request.identity_id,
        payment_id = %reconciled.payment.id,
        amount = %request.amount,
        method = %request.method,
        balance = %reconciled.balance_after,
        "manual payment recorded"
    );

    effects.dispatch(receipt_effect(&reconciled, &profile));

    Ok(reconciled)
}

/// Settles `amount` against a locked profile and appends the payment row.
///
/// Both writes share the caller's transaction; nothing is visible until it commits.
pub(crate) async fn reconcile<T: TenancyTx>(
    tx: &mut T,
    profile: &TenantProfile,
    amount: Decimal,
    payment_type: PaymentType,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> BillingResult<Reconciled> {
    let balance_after = ledger::settle(tx, profile.identity_id, amount).await?;

    let payment = Payment {
        id: Uuid::new_v4(),
        tenant_id: profile.identity_id,
        property_id: profile.property_id,
        amount,
        payment_type,
        method,
        paid_at: now,
    };
    tx.insert_payment(&payment).await?;

    Ok(Reconciled {
        payment,
        tenant_name: profile.name.clone(),
        balance_before: profile.balance,
        balance_after,
    })
}

pub(crate) fn receipt_effect(reconciled: &Reconciled, profile: &TenantProfile) -> SideEffect {
    SideEffect::Receipt(ReceiptRequest {
        payment: reconciled.payment.clone(),
        tenant_name: reconciled.tenant_name.clone(),
        destination: profile.phone.clone(),
        balance_after: reconciled.balance_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pgstay_core::{KycDetails, TenantStatus};
    use pgstay_memstore::{FailPoint, InMemoryTenancyStore};

    async fn store_with_tenant(balance: Decimal) -> (InMemoryTenancyStore, TenantProfile) {
        let store = InMemoryTenancyStore::new();
        let now = Utc::now();
        let profile = TenantProfile {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            name: "Meera".to_string(),
            phone: "9000000009".to_string(),
            status: TenantStatus::Active,
            details: KycDetails::default(),
            monthly_rent: Decimal::from(5000),
            deposit: Decimal::from(2000),
            balance,
            admission_date: now,
            last_billing_date: None,
            next_billing_date: now + Duration::days(30),
            otp: None,
            is_verified: true,
            last_balance_check: None,
            created_at: now,
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_profile(&profile).await.unwrap();
        tx.commit().await.unwrap();
        (store, profile)
    }

    #[tokio::test]
    async fn test_manual_payment_decrements_and_records() {
        let (store, profile) = store_with_tenant(Decimal::from(7000)).await;
        let (effects, mut receiver) = EffectQueue::bounded(8);

        let reconciled = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: profile.identity_id,
                amount: Decimal::from(3000),
                method: PaymentMethod::Cash,
            },
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(reconciled.balance_before, Decimal::from(7000));
        assert_eq!(reconciled.balance_after, Decimal::from(4000));
        let payments = store.payments_for(profile.identity_id).await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, Decimal::from(3000));
        assert_eq!(payments[0].payment_type, PaymentType::ManualPayment);
        assert!(matches!(receiver.try_next(), Some(SideEffect::Receipt(_))));
    }

    #[tokio::test]
    async fn test_overpayment_leaves_credit() {
        let (store, profile) = store_with_tenant(Decimal::from(1000)).await;
        let (effects, _receiver) = EffectQueue::bounded(8);

        let reconciled = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: profile.identity_id,
                amount: Decimal::from(1500),
                method: PaymentMethod::Bank,
            },
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(reconciled.balance_after, Decimal::from(-500));
    }

    #[tokio::test]
    async fn test_failed_payment_insert_keeps_balance() {
        let (store, profile) = store_with_tenant(Decimal::from(7000)).await;
        let (effects, mut receiver) = EffectQueue::bounded(8);
        store.fail_on(FailPoint::InsertPayment);

        let err = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: profile.identity_id,
                amount: Decimal::from(3000),
                method: PaymentMethod::Upi,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BillingError::Storage(_)));
        let stored = store.profile(profile.identity_id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Decimal::from(7000));
        assert!(store.payments_for(profile.identity_id).await.is_empty());
        assert!(receiver.try_next().is_none());
    }

    #[tokio::test]
    async fn test_unknown_tenant_and_bad_amount() {
        let (store, profile) = store_with_tenant(Decimal::from(7000)).await;
        let (effects, _receiver) = EffectQueue::bounded(8);

        let err = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: Uuid::new_v4(),
                amount: Decimal::from(10),
                method: PaymentMethod::Cash,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::TenantNotFound(_)));

        let err = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: profile.identity_id,
                amount: Decimal::ZERO,
                method: PaymentMethod::Cash,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_sub_paise_amount_leaves_ledger_untouched() {
        let (store, profile) = store_with_tenant(Decimal::from(7000)).await;
        let (effects, mut receiver) = EffectQueue::bounded(8);

        let err = record_manual_payment(
            &store,
            &effects,
            ManualPayment {
                identity_id: profile.identity_id,
                amount: Decimal::new(100005, 3),
                method: PaymentMethod::Upi,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            BillingError::InvalidAmount(amount) if amount == Decimal::new(100005, 3)
        ));
        let stored = store.profile(profile.identity_id).await.unwrap().unwrap();
        assert_eq!(stored.balance, Decimal::from(7000));
        assert!(store.payments_for(profile.identity_id).await.is_empty());
        assert!(receiver.try_next().is_none());
    }
}
