use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgstay_core::{
    ArchivedTenant, Identity, Payment, Room, StoreError, StoreResult, TenancyStore, TenancyTx,
    TenantProfile, TenantStatus, TenantSummary,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Write steps that can be made to fail once, for exercising rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertIdentity,
    InsertProfile,
    InsertPayment,
    InsertArchive,
    DeleteIdentity,
    AdjustBalance(Uuid),
}

#[derive(Debug, Clone, Default)]
struct State {
    identities: HashMap<Uuid, Identity>,
    rooms: HashMap<Uuid, Room>,
    profiles: HashMap<Uuid, TenantProfile>,
    payments: Vec<Payment>,
    archives: Vec<ArchivedTenant>,
    webhook_events: HashMap<String, Uuid>,
}

/// Tenancy store held entirely in memory.
///
/// A transaction takes the store lock, works on a private copy of the state and
/// swaps it in on commit, so transactions are fully serialised.
#[derive(Clone, Default)]
pub struct InMemoryTenancyStore {
    state: Arc<Mutex<State>>,
    fail_points: Arc<StdMutex<Vec<FailPoint>>>,
}

impl InMemoryTenancyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_room(&self, room: Room) {
        self.state.lock().await.rooms.insert(room.id, room);
    }

    /// Arms a one-shot failure at the given step.
    pub fn fail_on(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.push(point);
        }
    }

    pub async fn identity(&self, identity_id: Uuid) -> Option<Identity> {
        self.state.lock().await.identities.get(&identity_id).cloned()
    }

    pub async fn identity_count(&self) -> usize {
        self.state.lock().await.identities.len()
    }

    pub async fn profile_count(&self) -> usize {
        self.state.lock().await.profiles.len()
    }

    pub async fn payments_for(&self, identity_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .await
            .payments
            .iter()
            .filter(|payment| payment.tenant_id == identity_id)
            .cloned()
            .collect()
    }

    pub async fn archive_for(&self, identity_id: Uuid) -> Vec<ArchivedTenant> {
        self.state
            .lock()
            .await
            .archives
            .iter()
            .filter(|archive| archive.original_identity_id == identity_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TenancyStore for InMemoryTenancyStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx {
            guard,
            working,
            fail_points: self.fail_points.clone(),
        })
    }

    async fn profile(&self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>> {
        Ok(self.state.lock().await.profiles.get(&identity_id).cloned())
    }

    async fn due_for_billing(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut due: Vec<&TenantProfile> = state
            .profiles
            .values()
            .filter(|profile| {
                profile.status == TenantStatus::Active && profile.next_billing_date <= now
            })
            .collect();
        due.sort_by_key(|profile| profile.next_billing_date);
        Ok(due.into_iter().map(|profile| profile.identity_id).collect())
    }

    async fn payments(&self) -> StoreResult<Vec<Payment>> {
        let mut payments = self.state.lock().await.payments.clone();
        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(payments)
    }

    async fn tenant_name(&self, identity_id: Uuid) -> StoreResult<Option<String>> {
        let state = self.state.lock().await;
        if let Some(profile) = state.profiles.get(&identity_id) {
            return Ok(Some(profile.name.clone()));
        }
        Ok(state
            .archives
            .iter()
            .find(|archive| archive.original_identity_id == identity_id)
            .map(|archive| archive.name.clone()))
    }

    async fn tenants_by_property(&self, property_id: Uuid) -> StoreResult<Vec<TenantSummary>> {
        let state = self.state.lock().await;
        let mut roster: Vec<TenantSummary> = state
            .profiles
            .values()
            .filter_map(|profile| {
                let room = state.rooms.get(&profile.room_id)?;
                if room.property_id != property_id {
                    return None;
                }
                let name = state
                    .identities
                    .get(&profile.identity_id)
                    .map_or_else(|| profile.name.clone(), |identity| identity.name.clone());
                Some(TenantSummary {
                    identity_id: profile.identity_id,
                    name,
                    room_no: room.room_no.clone(),
                    phone: profile.phone.clone(),
                    status: profile.status,
                })
            })
            .collect();
        roster.sort_by(|a, b| a.room_no.cmp(&b.room_no).then_with(|| a.name.cmp(&b.name)));
        Ok(roster)
    }

    async fn archived_tenants(&self, property_id: Uuid) -> StoreResult<Vec<ArchivedTenant>> {
        let mut archives: Vec<ArchivedTenant> = self
            .state
            .lock()
            .await
            .archives
            .iter()
            .filter(|archive| archive.property_id == property_id)
            .cloned()
            .collect();
        archives.sort_by(|a, b| b.checkout_date.cmp(&a.checkout_date));
        Ok(archives)
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
    fail_points: Arc<StdMutex<Vec<FailPoint>>>,
}

impl InMemoryTx {
    fn trip(&self, point: FailPoint) -> StoreResult<()> {
        let Ok(mut points) = self.fail_points.lock() else {
            return Ok(());
        };
        if let Some(position) = points.iter().position(|armed| *armed == point) {
            points.remove(position);
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn profile_mut(&mut self, identity_id: Uuid) -> StoreResult<&mut TenantProfile> {
        self.working
            .profiles
            .get_mut(&identity_id)
            .ok_or_else(|| anyhow::anyhow!("profile {identity_id} vanished mid-transaction").into())
    }
}

#[async_trait]
impl TenancyTx for InMemoryTx {
    async fn room(&mut self, room_id: Uuid) -> StoreResult<Option<Room>> {
        Ok(self.working.rooms.get(&room_id).cloned())
    }

    async fn count_active_in_room(&mut self, room_id: Uuid) -> StoreResult<i64> {
        let count = self
            .working
            .profiles
            .values()
            .filter(|profile| profile.room_id == room_id && profile.status == TenantStatus::Active)
            .count();
        Ok(count as i64)
    }

    async fn insert_identity(&mut self, identity: &Identity) -> StoreResult<()> {
        self.trip(FailPoint::InsertIdentity)?;
        if self
            .working
            .identities
            .values()
            .any(|existing| existing.phone == identity.phone)
        {
            return Err(StoreError::UniqueViolation("identities_phone_key".to_string()));
        }
        self.working
            .identities
            .insert(identity.id, identity.clone());
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &TenantProfile) -> StoreResult<()> {
        self.trip(FailPoint::InsertProfile)?;
        if self
            .working
            .profiles
            .values()
            .any(|existing| existing.phone == profile.phone)
        {
            return Err(StoreError::UniqueViolation(
                "tenant_profiles_phone_key".to_string(),
            ));
        }
        self.working
            .profiles
            .insert(profile.identity_id, profile.clone());
        Ok(())
    }

    async fn lock_profile(&mut self, identity_id: Uuid) -> StoreResult<Option<TenantProfile>> {
        Ok(self.working.profiles.get(&identity_id).cloned())
    }

    async fn activate_profile(&mut self, identity_id: Uuid, balance: Decimal) -> StoreResult<()> {
        let profile = self.profile_mut(identity_id)?;
        profile.status = TenantStatus::Active;
        profile.is_verified = true;
        profile.otp = None;
        profile.balance = balance;
        Ok(())
    }

    async fn adjust_balance(&mut self, identity_id: Uuid, delta: Decimal) -> StoreResult<Decimal> {
        self.trip(FailPoint::AdjustBalance(identity_id))?;
        let profile = self.profile_mut(identity_id)?;
        profile.balance += delta;
        Ok(profile.balance)
    }

    async fn set_billing_dates(
        &mut self,
        identity_id: Uuid,
        last_billing_date: DateTime<Utc>,
        next_billing_date: DateTime<Utc>,
    ) -> StoreResult<()> {
        let profile = self.profile_mut(identity_id)?;
        profile.last_billing_date = Some(last_billing_date);
        profile.next_billing_date = next_billing_date;
        Ok(())
    }

    async fn set_last_balance_check(
        &mut self,
        identity_id: Uuid,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.profile_mut(identity_id)?.last_balance_check = Some(checked_at);
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.trip(FailPoint::InsertPayment)?;
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn claim_webhook_event(
        &mut self,
        event_key: &str,
        identity_id: Uuid,
        _received_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if self.working.webhook_events.contains_key(event_key) {
            return Ok(false);
        }
        self.working
            .webhook_events
            .insert(event_key.to_string(), identity_id);
        Ok(true)
    }

    async fn insert_archive(&mut self, archive: &ArchivedTenant) -> StoreResult<()> {
        self.trip(FailPoint::InsertArchive)?;
        self.working.archives.push(archive.clone());
        Ok(())
    }

    async fn delete_profile(&mut self, identity_id: Uuid) -> StoreResult<()> {
        self.working.profiles.remove(&identity_id);
        Ok(())
    }

    async fn delete_identity(&mut self, identity_id: Uuid) -> StoreResult<()> {
        self.trip(FailPoint::DeleteIdentity)?;
        if self.working.profiles.contains_key(&identity_id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "identity {identity_id} still referenced by a tenant profile"
            )));
        }
        self.working.identities.remove(&identity_id);
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let InMemoryTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
