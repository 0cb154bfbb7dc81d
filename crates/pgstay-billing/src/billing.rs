use chrono::{DateTime, Duration, Utc};
use pgstay_core::{BillingResult, TenancyStore, TenancyTx, TenantStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    effects::{EffectQueue, PaymentNotice, PaymentRequest, SideEffect},
    ledger,
    reference::payment_reference,
};

pub const BILLING_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingRunSummary {
    pub due: usize,
    pub billed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct MonthlyBill {
    identity_id: Uuid,
    tenant_name: String,
    phone: String,
    rent: Decimal,
    balance: Decimal,
}

/// Accrues one month of rent for every active tenant due at `now`.
///
/// Each tenant is billed in its own transaction. A tenant whose step fails is
/// rolled back, logged and left for the next sweep; the rest still run. A
/// tenant advances one period per sweep. Bill notices wait for queue space
/// rather than being dropped, so the effect worker must be running.
pub async fn run_billing_cycle<S: TenancyStore>(
    store: &S,
    effects: &EffectQueue,
    now: DateTime<Utc>,
) -> BillingResult<BillingRunSummary> {
    let due = store.due_for_billing(now).await?;
    let mut summary = BillingRunSummary {
        due: due.len(),
        ..BillingRunSummary::default()
    };

    for identity_id in due {
        match bill_tenant(store, identity_id, now).await {
            Ok(Some(bill)) => {
                summary.billed += 1;
                let notice = SideEffect::PaymentRequest(PaymentRequest {
                    identity_id: bill.identity_id,
                    destination: bill.phone,
                    tenant_name: bill.tenant_name,
                    amount: bill.balance,
                    description: "Monthly-Rent".to_string(),
                    reference_id: payment_reference(bill.identity_id, now),
                    notice: PaymentNotice::MonthlyBill { rent: bill.rent },
                });
                effects.enqueue(notice).await;
            }
            Ok(None) => summary.skipped += 1,
            Err(err) => {
                summary.failed += 1;
                warn!(identity_id = %identity_id, error = %err, "billing step failed; tenant skipped");
            }
        }
    }

    info!(
        due = summary.due,
        billed = summary.billed,
        skipped = summary.skipped,
        failed = summary.failed,
        "billing cycle finished"
    );

    Ok(summary)
}

async fn bill_tenant<S: TenancyStore>(
    store: &S,
    identity_id: Uuid,
    now: DateTime<Utc>,
) -> BillingResult<Option<MonthlyBill>> {
    let mut tx = store.begin().await?;

    let Some(profile) = tx.lock_profile(identity_id).await? else {
        tx.rollback().await?;
        return Ok(None);
    };
    // Another sweep or an offboarding may have got here first.
    if profile.status != TenantStatus::Active || profile.next_billing_date > now {
        tx.rollback().await?;
        return Ok(None);
    }

    let balance = ledger::accrue(&mut tx, identity_id, profile.monthly_rent).await?;
    let next_billing_date = profile.next_billing_date + Duration::days(BILLING_PERIOD_DAYS);
    tx.set_billing_dates(identity_id, now, next_billing_date)
        .await?;

    tx.commit().await?;

    info!(
        identity_id = %identity_id,
        rent = %profile.monthly_rent,
        balance = %balance,
        next_billing_date = %next_billing_date,
        "rent accrued"
    );

    Ok(Some(MonthlyBill {
        identity_id,
        tenant_name: profile.name,
        phone: profile.phone,
        rent: profile.monthly_rent,
        balance,
    }))
}
