use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Payment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    pub identity_id: Uuid,
    pub amount: Decimal,
    pub description: String,
    /// Echoed back by the provider in the paid webhook.
    pub reference_id: String,
}

#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    async fn create_link(&self, request: &PaymentLinkRequest) -> anyhow::Result<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReceiptGenerator: Send + Sync {
    /// Returns a reference (usually a URL) to the generated receipt.
    async fn generate(&self, payment: &Payment, tenant_name: &str) -> anyhow::Result<String>;
}
