use rust_decimal::Decimal;
use uuid::Uuid;

use crate::storage::StoreError;

/// Coarse classification callers switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    RateLimited,
    BadExternalPayload,
    OutstandingBalance,
    InvalidInput,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("room {0} not found")]
    RoomNotFound(Uuid),

    #[error("tenant profile for identity {0} not found")]
    TenantNotFound(Uuid),

    #[error("room {room_no} is full")]
    RoomFull { room_no: String },

    #[error("phone number {0} is already registered")]
    DuplicatePhone(String),

    #[error("invalid OTP: verification failed")]
    VerificationFailed,

    #[error("tenant {0} is not awaiting verification")]
    NotAwaitingVerification(Uuid),

    #[error("limit reached: balance can only be checked once per day")]
    BalanceCheckThrottled,

    #[error("invalid webhook payload: {0}")]
    BadWebhookPayload(String),

    #[error("outstanding balance: {:.2}", .0.round_dp(2))]
    OutstandingBalance(Decimal),

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::RoomNotFound(_) | BillingError::TenantNotFound(_) => ErrorKind::NotFound,
            BillingError::RoomFull { .. } | BillingError::DuplicatePhone(_) => ErrorKind::Conflict,
            BillingError::VerificationFailed | BillingError::NotAwaitingVerification(_) => {
                ErrorKind::Unauthorized
            }
            BillingError::BalanceCheckThrottled => ErrorKind::RateLimited,
            BillingError::BadWebhookPayload(_) => ErrorKind::BadExternalPayload,
            BillingError::OutstandingBalance(_) => ErrorKind::OutstandingBalance,
            BillingError::InvalidAmount(_) | BillingError::InvalidInput(_) => ErrorKind::InvalidInput,
            BillingError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        BillingError::Storage(err)
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
