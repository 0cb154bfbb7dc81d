pub mod collaborators;
pub mod error;
pub mod models;
pub mod storage;

pub use collaborators::{Notifier, PaymentLinkProvider, PaymentLinkRequest, ReceiptGenerator};
pub use error::{BillingError, BillingResult, ErrorKind};
pub use models::{
    ArchivedTenant, Identity, KycDetails, Payment, PaymentMethod, PaymentType, Room,
    RoomOccupancy, TenantProfile, TenantStatus, TenantSummary,
};
pub use storage::{StoreError, StoreResult, TenancyStore, TenancyTx};
