//! Production implementations of the tenancy collaborators.

use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgstay_core::{Notifier, Payment, PaymentLinkProvider, PaymentLinkRequest, ReceiptGenerator};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{config::ServiceConfig, redis_bus::RedisBus};

pub const NOTIFICATIONS_CHANNEL: &str = "notifications.outbound";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub destination: String,
    pub message: String,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Redis,
    Log,
}

impl FromStr for NotifierKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(NotifierKind::Redis),
            "log" => Ok(NotifierKind::Log),
            other => anyhow::bail!("unsupported notifier: {other}"),
        }
    }
}

/// The collaborators an effect worker runs against, built from configuration.
#[derive(Clone)]
pub struct Collaborators {
    pub links: Arc<dyn PaymentLinkProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub receipts: Arc<dyn ReceiptGenerator>,
}

impl Collaborators {
    pub fn from_config(config: &ServiceConfig, bus: RedisBus) -> Self {
        let notifier: Arc<dyn Notifier> = match config.notifier {
            NotifierKind::Redis => Arc::new(RedisNotifier::new(bus)),
            NotifierKind::Log => Arc::new(LogNotifier),
        };

        Self {
            links: Arc::new(HostedLinkProvider::new(config.payment_link_base.clone())),
            notifier,
            receipts: Arc::new(FileReceiptGenerator::new(
                config.receipts_dir.clone(),
                config.base_url.clone(),
            )),
        }
    }
}

/// Hands messages to the messaging relay over Redis pub/sub.
#[derive(Clone)]
pub struct RedisNotifier {
    bus: RedisBus,
}

impl RedisNotifier {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        let notification = OutboundNotification {
            destination: destination.to_string(),
            message: message.to_string(),
            queued_at: Utc::now(),
        };
        self.bus
            .publish_json(NOTIFICATIONS_CHANNEL, &notification)
            .await
            .with_context(|| format!("failed to publish notification for {destination}"))
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<()> {
        info!(destination, message, "notification");
        Ok(())
    }
}

#[derive(Clone)]
pub struct HostedLinkProvider {
    base: String,
}

impl HostedLinkProvider {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl PaymentLinkProvider for HostedLinkProvider {
    async fn create_link(&self, request: &PaymentLinkRequest) -> Result<String> {
        if request.amount <= Decimal::ZERO {
            anyhow::bail!("payment link amount must be positive, got {}", request.amount);
        }
        Ok(format!(
            "{}/{}?amount={:.2}",
            self.base.trim_end_matches('/'),
            request.reference_id,
            request.amount.round_dp(2)
        ))
    }
}

/// Plain-text receipts written under a local directory and served from
/// `<base_url>/receipts/`.
#[derive(Clone)]
pub struct FileReceiptGenerator {
    dir: PathBuf,
    base_url: String,
}

impl FileReceiptGenerator {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    pub fn file_name(payment: &Payment) -> String {
        format!("receipt_{}.txt", payment.id.simple())
    }
}

#[async_trait]
impl ReceiptGenerator for FileReceiptGenerator {
    async fn generate(&self, payment: &Payment, tenant_name: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let file_name = Self::file_name(payment);
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, render_receipt(payment, tenant_name))
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(format!(
            "{}/receipts/{}",
            self.base_url.trim_end_matches('/'),
            file_name
        ))
    }
}

fn render_receipt(payment: &Payment, tenant_name: &str) -> String {
    format!(
        "PAYMENT RECEIPT\n\
         Receipt No: #PAY-{}\n\
         Date: {}\n\
         \n\
         Tenant Name: {}\n\
         Particulars: {}\n\
         Method: {}\n\
         Total Amount: INR {:.2}\n",
        payment.id.simple(),
        payment.paid_at.format("%d-%b-%Y"),
        tenant_name,
        payment.payment_type.as_str(),
        payment.method,
        payment.amount.round_dp(2),
    )
}
