//! Admission: `absent -> pending -> active`.
//!
//! [`onboard`] creates the identity and a `pending` profile in one
//! transaction and sends the OTP out of band. [`confirm_admission`] checks the
//! OTP, activates the profile and seeds the balance with rent plus deposit.

use chrono::{DateTime, Months, Utc};
use pgstay_core::{
    BillingError, BillingResult, Identity, KycDetails, StoreError, TenancyStore, TenancyTx,
    TenantProfile, TenantStatus,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    effects::{EffectQueue, PaymentNotice, PaymentRequest, SideEffect},
    ledger,
    reference::payment_reference,
};

const OTP_DIGITS: usize = 6;
const TENANT_ROLE: &str = "tenant";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardTenant {
    pub room_id: Uuid,
    pub name: String,
    pub phone: String,
    /// Defaults to the room's per-bed price.
    pub monthly_rent: Option<Decimal>,
    /// Defaults to now.
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: KycDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardedTenant {
    pub identity_id: Uuid,
    pub profile_id: Uuid,
    pub status: TenantStatus,
    pub next_billing_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfirmed {
    pub identity_id: Uuid,
    pub status: TenantStatus,
    pub balance: Decimal,
}

pub async fn onboard<S: TenancyStore>(
    store: &S,
    effects: &EffectQueue,
    input: OnboardTenant,
    now: DateTime<Utc>,
) -> BillingResult<OnboardedTenant> {
    let name = required(&input.name, "name")?;
    let phone = required(&input.phone, "phone")?;
    if let Some(rent) = input.monthly_rent {
        ledger::checked_amount(rent)?;
    }

    let mut tx = store.begin().await?;

    let room = tx
        .room(input.room_id)
        .await?
        .ok_or(BillingError::RoomNotFound(input.room_id))?;
    let active_tenants = tx.count_active_in_room(room.id).await?;
    if active_tenants >= i64::from(room.capacity) {
        warn!(room_id = %room.id, room_no = %room.room_no, active_tenants, "room is full");
        return Err(BillingError::RoomFull {
            room_no: room.room_no,
        });
    }

    let identity = Identity {
        id: Uuid::new_v4(),
        name: name.clone(),
        phone: phone.clone(),
        role: TENANT_ROLE.to_string(),
        created_at: now,
    };
    tx.insert_identity(&identity)
        .await
        .map_err(|err| phone_conflict(err, &phone))?;

    let admission_date = input.admission_date.unwrap_or(now);
    let next_billing_date = admission_date
        .checked_add_months(Months::new(1))
        .ok_or_else(|| BillingError::InvalidInput("admission_date out of range".to_string()))?;
    let otp = generate_otp();

    let profile = TenantProfile {
        id: Uuid::new_v4(),
        identity_id: identity.id,
        property_id: room.property_id,
        room_id: room.id,
        name,
        phone: phone.clone(),
        status: TenantStatus::Pending,
        details: input.details,
        monthly_rent: input.monthly_rent.unwrap_or(room.price),
        deposit: room.deposit,
        balance: Decimal::ZERO,
        admission_date,
        last_billing_date: None,
        next_billing_date,
        otp: Some(otp.clone()),
        is_verified: false,
        last_balance_check: None,
        created_at: now,
    };
    tx.insert_profile(&profile)
        .await
        .map_err(|err| phone_conflict(err, &phone))?;

    tx.commit().await?;

    info!(
        identity_id = %identity.id,
        room_no = %room.room_no,
        "tenant onboarded; OTP issued"
    );

    effects.dispatch(SideEffect::Notify {
        destination: phone,
        message: format!(
            "Namaste {}! Your admission OTP is {otp}. Share it with the owner to confirm your stay.",
            profile.name
        ),
    });

    Ok(OnboardedTenant {
        identity_id: identity.id,
        profile_id: profile.id,
        status: profile.status,
        next_billing_date,
    })
}

pub async fn confirm_admission<S: TenancyStore>(
    store: &S,
    effects: &EffectQueue,
    identity_id: Uuid,
    otp: &str,
    now: DateTime<Utc>,
) -> BillingResult<AdmissionConfirmed> {
    let mut tx = store.begin().await?;

    let profile = tx
        .lock_profile(identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(identity_id))?;
    if profile.status != TenantStatus::Pending {
        return Err(BillingError::NotAwaitingVerification(identity_id));
    }
    if profile.otp.as_deref() != Some(otp.trim()) {
        warn!(identity_id = %identity_id, "OTP mismatch");
        return Err(BillingError::VerificationFailed);
    }

    let room = tx
        .room(profile.room_id)
        .await?
        .ok_or(BillingError::RoomNotFound(profile.room_id))?;
    // Pending tenants hold no bed, so the room may have filled since onboarding.
    if tx.count_active_in_room(room.id).await? >= i64::from(room.capacity) {
        warn!(identity_id = %identity_id, room_no = %room.room_no, "room filled before confirmation");
        return Err(BillingError::RoomFull {
            room_no: room.room_no,
        });
    }
    let initial_due = ledger::initial_due(profile.monthly_rent, room.deposit);
    ledger::open(&mut tx, identity_id, initial_due).await?;

    tx.commit().await?;

    info!(
        identity_id = %identity_id,
        balance = %initial_due,
        "admission confirmed"
    );

    effects.dispatch(SideEffect::PaymentRequest(PaymentRequest {
        identity_id,
        destination: profile.phone.clone(),
        tenant_name: profile.name.clone(),
        amount: initial_due,
        description: "Initial Rent + Deposit".to_string(),
        reference_id: payment_reference(identity_id, now),
        notice: PaymentNotice::AdmissionConfirmed,
    }));

    Ok(AdmissionConfirmed {
        identity_id,
        status: TenantStatus::Active,
        balance: initial_due,
    })
}

/// Six decimal digits drawn from the operating system's CSPRNG.
fn generate_otp() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn required(value: &str, field: &str) -> BillingResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BillingError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn phone_conflict(err: StoreError, phone: &str) -> BillingError {
    match err {
        StoreError::UniqueViolation(_) => BillingError::DuplicatePhone(phone.to_string()),
        other => other.into(),
    }
}
