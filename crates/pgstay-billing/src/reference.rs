use chrono::{DateTime, Utc};
use pgstay_core::{BillingError, BillingResult};
use uuid::Uuid;

const REFERENCE_PREFIX: &str = "BILL";

/// Reference token embedded in a payment link: `BILL-<identity>-<unix seconds>`.
///
/// The identity is written without hyphens so it stays a single `-` field.
pub fn payment_reference(identity_id: Uuid, issued_at: DateTime<Utc>) -> String {
    format!(
        "{REFERENCE_PREFIX}-{}-{}",
        identity_id.simple(),
        issued_at.timestamp()
    )
}

/// Recovers the identity from the second `-` field of a reference token.
pub fn identity_from_reference(reference_id: &str) -> BillingResult<Uuid> {
    let raw = reference_id
        .split('-')
        .nth(1)
        .filter(|field| !field.is_empty())
        .ok_or_else(|| invalid_reference(reference_id))?;

    Uuid::parse_str(raw).map_err(|_| invalid_reference(reference_id))
}

fn invalid_reference(reference_id: &str) -> BillingError {
    BillingError::BadWebhookPayload(format!("invalid reference_id format: {reference_id}"))
}
