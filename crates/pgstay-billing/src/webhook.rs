//! Online payments reported by the payment-link provider.
//!
//! [`decode_webhook`] is the only place that looks at the raw JSON. Everything
//! after it works on [`WebhookEvent`].

use chrono::{DateTime, Utc};
use pgstay_core::{
    BillingError, BillingResult, PaymentMethod, PaymentType, TenancyStore, TenancyTx,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    effects::EffectQueue,
    reconciliation::{Reconciled, receipt_effect, reconcile},
    reference::identity_from_reference,
};

pub const PAYMENT_LINK_PAID: &str = "payment_link.paid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Ignored { event: String },
    PaymentLinkPaid(PaidLink),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidLink {
    pub identity_id: Uuid,
    pub amount: Decimal,
    pub reference_id: String,
    /// Provider payment id, else payment-link id.
    pub event_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored { event: String },
    Duplicate { event_key: String },
    Applied(Reconciled),
}

#[derive(Deserialize)]
struct Envelope {
    event: Option<String>,
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct PaidPayload {
    payment_link: Wrapped<LinkEntity>,
    payment: Option<Wrapped<PaymentEntity>>,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Deserialize)]
struct LinkEntity {
    id: Option<String>,
    /// Minor units (paise).
    amount: u64,
    reference_id: String,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: Option<String>,
}

pub fn decode_webhook(raw: &Value) -> BillingResult<WebhookEvent> {
    let envelope = Envelope::deserialize(raw).map_err(bad_payload)?;
    let event = envelope.event.unwrap_or_default();
    if event != PAYMENT_LINK_PAID {
        return Ok(WebhookEvent::Ignored { event });
    }

    let payload = envelope
        .payload
        .ok_or_else(|| BillingError::BadWebhookPayload("missing field `payload`".to_string()))?;
    let paid = PaidPayload::deserialize(&payload).map_err(bad_payload)?;

    let link = paid.payment_link.entity;
    let amount_minor = i64::try_from(link.amount).map_err(|_| {
        BillingError::BadWebhookPayload(format!("amount out of range: {}", link.amount))
    })?;
    if amount_minor == 0 {
        return Err(BillingError::BadWebhookPayload(
            "amount must be positive".to_string(),
        ));
    }
    let identity_id = identity_from_reference(&link.reference_id)?;
    let event_key = paid
        .payment
        .and_then(|payment| payment.entity.id)
        .or(link.id)
        .filter(|key| !key.is_empty());

    Ok(WebhookEvent::PaymentLinkPaid(PaidLink {
        identity_id,
        amount: Decimal::new(amount_minor, 2),
        reference_id: link.reference_id,
        event_key,
    }))
}

/// Applies a provider callback. Redelivered payments are acknowledged without
/// touching the balance.
pub async fn apply_webhook<S: TenancyStore>(
    store: &S,
    effects: &EffectQueue,
    raw: &Value,
    now: DateTime<Utc>,
) -> BillingResult<WebhookOutcome> {
    let paid = match decode_webhook(raw)? {
        WebhookEvent::Ignored { event } => {
            info!(event = %event, "webhook event ignored");
            return Ok(WebhookOutcome::Ignored { event });
        }
        WebhookEvent::PaymentLinkPaid(paid) => paid,
    };

    let mut tx = store.begin().await?;
    let profile = tx
        .lock_profile(paid.identity_id)
        .await?
        .ok_or(BillingError::TenantNotFound(paid.identity_id))?;

    match paid.event_key.as_deref() {
        Some(event_key) => {
            if !tx
                .claim_webhook_event(event_key, paid.identity_id, now)
                .await?
            {
                tx.rollback().await?;
                info!(event_key, identity_id = %paid.identity_id, "duplicate webhook delivery");
                return Ok(WebhookOutcome::Duplicate {
                    event_key: event_key.to_string(),
                });
            }
        }
        None => warn!(
            reference_id = %paid.reference_id,
            "webhook carries no payment id; applying without deduplication"
        ),
    }

    let reconciled = reconcile(
        &mut tx,
        &profile,
        paid.amount,
        PaymentType::RentPayment,
        PaymentMethod::Razorpay,
        now,
    )
    .await?;

    tx.commit().await?;

    info!(
        identity_id = %paid.identity_id,
        payment_id = %reconciled.payment.id,
        amount = %paid.amount,
        balance = %reconciled.balance_after,
        "online payment reconciled"
    );

    effects.dispatch(receipt_effect(&reconciled, &profile));

    Ok(WebhookOutcome::Applied(reconciled))
}

fn bad_payload(err: serde_json::Error) -> BillingError {
    BillingError::BadWebhookPayload(err.to_string())
}
