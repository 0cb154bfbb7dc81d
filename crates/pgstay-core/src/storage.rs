use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{ArchivedTenant, Identity, Payment, Room, TenantProfile, TenantSummary};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to tenancy storage.
///
/// Every balance mutation goes through a [`TenancyTx`]; the plain reads here
/// never feed a read-modify-write.
#[async_trait]
pub trait TenancyStore: Send + Sync {
    type Tx: TenancyTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn profile(&self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>>;

    /// Identity ids of active profiles whose next billing date is at or before `now`.
    async fn due_for_billing(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;

    /// Newest first.
    async fn payments(&self) -> StoreResult<Vec<Payment>>;

    /// Live profile name, falling back to the archive.
    async fn tenant_name(&self, identity_id: Uuid) -> StoreResult<Option<String>>;

    /// Live tenants of every room in the property, ordered by room then name.
    async fn tenants_by_property(&self, property_id: Uuid) -> StoreResult<Vec<TenantSummary>>;

    /// Newest checkout first.
    async fn archived_tenants(&self, property_id: Uuid) -> StoreResult<Vec<ArchivedTenant>>;
}

/// One unit of work. Dropping a transaction without calling `commit` discards
/// every write made through it.
#[async_trait]
pub trait TenancyTx: Send {
    async fn room(&mut self, room_id: Uuid) -> StoreResult<Option<Room>>;

    async fn count_active_in_room(&mut self, room_id: Uuid) -> StoreResult<i64>;

    async fn insert_identity(&mut self, identity: &Identity) -> StoreResult<()>;

    async fn insert_profile(&mut self, profile: &TenantProfile) -> StoreResult<()>;

    /// Reads the profile and holds its row lock until the transaction ends.
    async fn lock_profile(&mut self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>>;

    async fn activate_profile(&mut self, identity_id: Uuid, balance: Decimal) -> StoreResult<()>;

    /// Adds `delta` to the balance and returns the new balance.
    async fn adjust_balance(&mut self, identity_id: Uuid, delta: Decimal) -> StoreResult<Decimal>;

    async fn set_billing_dates(
        &mut self,
        identity_id: Uuid,
        last_billing_date: DateTime<Utc>,
        next_billing_date: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn set_last_balance_check(
        &mut self,
        identity_id: Uuid,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Records a webhook event key. Returns `false` when the key was already taken.
    async fn claim_webhook_event(
        &mut self,
        event_key: &str,
        identity_id: Uuid,
        received_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn insert_archive(&mut self, archive: &ArchivedTenant) -> StoreResult<()>;

    async fn delete_profile(&mut self, identity_id: Uuid) -> StoreResult<()>;

    async fn delete_identity(&mut self, identity_id: Uuid) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
