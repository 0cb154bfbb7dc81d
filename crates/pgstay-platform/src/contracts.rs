use chrono::{DateTime, Utc};
use pgstay_core::KycDetails;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub room_id: Uuid,
    pub name: String,
    pub phone: String,
    pub monthly_rent: Option<Decimal>,
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: KycDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAdmissionRequest {
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub tenant_id: Uuid,
    pub amount: Decimal,
    /// Free-form method name such as `Cash`, `UPI` or `Bank Transfer`.
    #[serde(default = "default_payment_method")]
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub details: serde_json::Value,
}

fn default_payment_method() -> String {
    "Cash".to_string()
}
