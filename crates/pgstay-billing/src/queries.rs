use chrono::{DateTime, Utc};
use pgstay_core::{
    ArchivedTenant, BillingError, BillingResult, Payment, RoomOccupancy, TenancyStore, TenancyTx,
    TenantProfile, TenantSummary,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub identity_id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub tenant_name: String,
}

/// Tenant-initiated balance lookup, limited to one per UTC calendar day.
pub async fn check_balance<S: TenancyStore>(
    store: &S,
    identity_id: Uuid,
    now: DateTime<Utc>,
) -> BillingResult<BalanceView> {
    let mut tx = store.begin().await?;

    let profile = tx
        .lock_profile(identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(identity_id))?;
    if let Some(last) = profile.last_balance_check
        && last.date_naive() == now.date_naive()
    {
        info!(identity_id = %identity_id, "balance check throttled");
        return Err(BillingError::BalanceCheckThrottled);
    }

    tx.set_last_balance_check(identity_id, now).await?;
    tx.commit().await?;

    Ok(BalanceView {
        identity_id,
        name: profile.name,
        balance: profile.balance,
        checked_at: now,
    })
}

pub async fn tenant_profile<S: TenancyStore>(
    store: &S,
    identity_id: Uuid,
) -> BillingResult<TenantProfile> {
    store
        .profile(identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(identity_id))
}

pub async fn room_occupancy<S: TenancyStore>(
    store: &S,
    room_id: Uuid,
) -> BillingResult<RoomOccupancy> {
    let mut tx = store.begin().await?;
    let room = tx
        .room(room_id)
        .await?
        .ok_or(BillingError::RoomNotFound(room_id))?;
    let occupied = tx.count_active_in_room(room_id).await?;
    tx.rollback().await?;

    Ok(RoomOccupancy {
        room_id,
        occupied,
        capacity: room.capacity,
    })
}

/// Every payment, newest first, named after the live or archived tenant.
pub async fn payment_history<S: TenancyStore>(store: &S) -> BillingResult<Vec<PaymentView>> {
    let payments = store.payments().await?;
    let mut views = Vec::with_capacity(payments.len());
    for payment in payments {
        let tenant_name = store
            .tenant_name(payment.tenant_id)
            .await?
            .unwrap_or_else(|| format!("Unknown (ID: {})", payment.tenant_id));
        views.push(PaymentView {
            payment,
            tenant_name,
        });
    }
    Ok(views)
}

pub async fn tenants_by_property<S: TenancyStore>(
    store: &S,
    property_id: Uuid,
) -> BillingResult<Vec<TenantSummary>> {
    Ok(store.tenants_by_property(property_id).await?)
}

pub async fn archived_tenants<S: TenancyStore>(
    store: &S,
    property_id: Uuid,
) -> BillingResult<Vec<ArchivedTenant>> {
    Ok(store.archived_tenants(property_id).await?)
}
