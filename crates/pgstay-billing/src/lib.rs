//! Tenancy billing workflows: admission, monthly accrual, payment
//! reconciliation and offboarding.
//!
//! Every workflow is generic over [`pgstay_core::TenancyStore`] and hands its
//! notifications to an [`EffectQueue`] only after its transaction commits.

pub mod billing;
pub mod effects;
pub mod ledger;
pub mod offboarding;
pub mod onboarding;
pub mod queries;
pub mod reconciliation;
pub mod reference;
pub mod webhook;

pub use billing::{BILLING_PERIOD_DAYS, BillingRunSummary, run_billing_cycle};
pub use effects::{EffectQueue, EffectReceiver, EffectWorker, SideEffect};
pub use offboarding::offboard;
pub use onboarding::{
    AdmissionConfirmed, OnboardTenant, OnboardedTenant, confirm_admission, onboard,
};
pub use queries::{
    BalanceView, PaymentView, archived_tenants, check_balance, payment_history, room_occupancy,
    tenant_profile, tenants_by_property,
};
pub use reconciliation::{ManualPayment, Reconciled, record_manual_payment};
pub use webhook::{WebhookEvent, WebhookOutcome, apply_webhook, decode_webhook};
