//! Post-commit side effects: notifications, payment links and receipts.
//!
//! Workflows hand effects to an [`EffectQueue`] after their transaction has
//! committed. A single [`EffectWorker`] drains the queue. Delivery is
//! at-most-once: an effect that cannot be queued or that fails while running
//! is logged as a dead letter and dropped, never retried.

use std::sync::Arc;

use pgstay_core::{Notifier, Payment, PaymentLinkProvider, PaymentLinkRequest, ReceiptGenerator};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ledger::display_amount;

pub const PLACEHOLDER_LINK: &str = "(payment link unavailable, please pay at the office)";

const DEAD_LETTER_TARGET: &str = "pgstay::dead_letter";

#[derive(Debug, Clone)]
pub enum SideEffect {
    Notify {
        destination: String,
        message: String,
    },
    PaymentRequest(PaymentRequest),
    Receipt(ReceiptRequest),
}

impl SideEffect {
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::Notify { .. } => "notify",
            SideEffect::PaymentRequest(_) => "payment_request",
            SideEffect::Receipt(_) => "receipt",
        }
    }

    fn destination(&self) -> &str {
        match self {
            SideEffect::Notify { destination, .. } => destination,
            SideEffect::PaymentRequest(request) => &request.destination,
            SideEffect::Receipt(request) => &request.destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentNotice {
    AdmissionConfirmed,
    MonthlyBill { rent: Decimal },
}

/// Ask the tenant to pay `amount` through a freshly created payment link.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub identity_id: Uuid,
    pub destination: String,
    pub tenant_name: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_id: String,
    pub notice: PaymentNotice,
}

#[derive(Debug, Clone)]
pub struct ReceiptRequest {
    pub payment: Payment,
    pub tenant_name: String,
    pub destination: String,
    pub balance_after: Decimal,
}

#[derive(Clone)]
pub struct EffectQueue {
    sender: mpsc::Sender<SideEffect>,
}

pub struct EffectReceiver {
    receiver: mpsc::Receiver<SideEffect>,
}

impl EffectQueue {
    pub fn bounded(capacity: usize) -> (Self, EffectReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, EffectReceiver { receiver })
    }

    /// Queues an effect without waiting. A full or closed queue drops it.
    pub fn dispatch(&self, effect: SideEffect) {
        match self.sender.try_send(effect) {
            Ok(()) => {}
            Err(TrySendError::Full(effect)) => dead_letter(&effect, "effect queue full"),
            Err(TrySendError::Closed(effect)) => dead_letter(&effect, "effect queue closed"),
        }
    }

    /// Waits for room in the queue. Only a closed queue drops the effect.
    ///
    /// For batch callers with no request to answer, such as the billing sweep.
    pub async fn enqueue(&self, effect: SideEffect) {
        if let Err(mpsc::error::SendError(effect)) = self.sender.send(effect).await {
            dead_letter(&effect, "effect queue closed");
        }
    }
}

impl EffectReceiver {
    pub async fn recv(&mut self) -> Option<SideEffect> {
        self.receiver.recv().await
    }

    /// Next queued effect, if one is ready.
    pub fn try_next(&mut self) -> Option<SideEffect> {
        self.receiver.try_recv().ok()
    }
}

pub struct EffectWorker {
    receiver: EffectReceiver,
    links: Arc<dyn PaymentLinkProvider>,
    notifier: Arc<dyn Notifier>,
    receipts: Arc<dyn ReceiptGenerator>,
}

impl EffectWorker {
    pub fn new(
        receiver: EffectReceiver,
        links: Arc<dyn PaymentLinkProvider>,
        notifier: Arc<dyn Notifier>,
        receipts: Arc<dyn ReceiptGenerator>,
    ) -> Self {
        Self {
            receiver,
            links,
            notifier,
            receipts,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`EffectQueue`] handle has been dropped.
    pub async fn run(mut self) {
        info!("effect worker started");
        while let Some(effect) = self.receiver.recv().await {
            self.handle(effect).await;
        }
        info!("effect worker stopped");
    }

    pub async fn handle(&self, effect: SideEffect) {
        debug!(effect = effect.label(), "running side effect");
        let result = match &effect {
            SideEffect::Notify {
                destination,
                message,
            } => self.notifier.send(destination, message).await,
            SideEffect::PaymentRequest(request) => self.request_payment(request).await,
            SideEffect::Receipt(request) => self.send_receipt(request).await,
        };

        if let Err(err) = result {
            dead_letter(&effect, &format!("{err:#}"));
        }
    }

    async fn request_payment(&self, request: &PaymentRequest) -> anyhow::Result<()> {
        let link = self
            .links
            .create_link(&PaymentLinkRequest {
                identity_id: request.identity_id,
                amount: request.amount,
                description: request.description.clone(),
                reference_id: request.reference_id.clone(),
            })
            .await
            .unwrap_or_else(|err| {
                warn!(
                    identity_id = %request.identity_id,
                    error = %err,
                    "payment link generation failed; sending placeholder"
                );
                PLACEHOLDER_LINK.to_string()
            });

        let message = match &request.notice {
            PaymentNotice::AdmissionConfirmed => format!(
                "Admission confirmed! Your initial total (rent + deposit) is Rs {}. Pay here: {}",
                display_amount(request.amount),
                link
            ),
            PaymentNotice::MonthlyBill { rent } => format!(
                "Namaste {}! Your monthly rent of Rs {} is due. Total balance: Rs {}. Pay here: {}",
                request.tenant_name,
                display_amount(*rent),
                display_amount(request.amount),
                link
            ),
        };

        self.notifier.send(&request.destination, &message).await
    }

    async fn send_receipt(&self, request: &ReceiptRequest) -> anyhow::Result<()> {
        let receipt = match self
            .receipts
            .generate(&request.payment, &request.tenant_name)
            .await
        {
            Ok(reference) => reference,
            Err(err) => {
                warn!(
                    payment_id = %request.payment.id,
                    error = %err,
                    "receipt generation failed"
                );
                "unavailable".to_string()
            }
        };

        let message = format!(
            "Payment received! Namaste {}, we received Rs {} via {}. Current balance: Rs {}. Receipt: {}",
            request.tenant_name,
            display_amount(request.payment.amount),
            request.payment.method,
            display_amount(request.balance_after),
            receipt
        );

        self.notifier.send(&request.destination, &message).await
    }
}

fn dead_letter(effect: &SideEffect, reason: &str) {
    error!(
        target: DEAD_LETTER_TARGET,
        effect = effect.label(),
        destination = effect.destination(),
        reason,
        "side effect dropped"
    );
}
