pub mod adapters;
pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_store;
pub mod redis_bus;

pub use adapters::{
    Collaborators, FileReceiptGenerator, HostedLinkProvider, LogNotifier, NOTIFICATIONS_CHANNEL,
    NotifierKind, OutboundNotification, RedisNotifier,
};
pub use config::ServiceConfig;
pub use contracts::{ConfirmAdmissionRequest, CreateTenantRequest, RecordPaymentRequest, WebhookAck};
pub use db::{apply_schema, connect_database};
pub use pg_store::{PgTenancyStore, PgTenancyTx};
pub use redis_bus::RedisBus;
