use chrono::{DateTime, Utc};
use pgstay_core::{ArchivedTenant, BillingError, BillingResult, TenancyStore, TenancyTx};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger;

/// Archives a settled tenant and removes the live profile and identity.
///
/// Only an exactly-zero balance may leave. Credit counts as outstanding so the
/// owner refunds it before checkout.
pub async fn offboard<S: TenancyStore>(
    store: &S,
    identity_id: Uuid,
    now: DateTime<Utc>,
) -> BillingResult<ArchivedTenant> {
    let mut tx = store.begin().await?;

    let profile = tx
        .lock_profile(identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(identity_id))?;
    if !ledger::is_settled(profile.balance) {
        warn!(identity_id = %identity_id, balance = %profile.balance, "offboarding refused");
        return Err(BillingError::OutstandingBalance(profile.balance));
    }

    let archive = ArchivedTenant::snapshot(&profile, now);
    tx.insert_archive(&archive).await?;
    tx.delete_profile(identity_id).await?;
    tx.delete_identity(identity_id).await?;

    tx.commit().await?;

    info!(
        identity_id = %identity_id,
        archive_id = %archive.id,
        room_id = %archive.room_id,
        "tenant offboarded"
    );

    Ok(archive)
}
