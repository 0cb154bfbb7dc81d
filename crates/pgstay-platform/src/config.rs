use std::time::Duration;

use anyhow::{Context, Result};

use crate::adapters::NotifierKind;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_PAYMENT_LINK_BASE: &str = "https://rzp.io/i";
const DEFAULT_RECEIPTS_DIR: &str = "public/receipts";
const DEFAULT_EFFECT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_BILLING_INTERVAL_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    /// Public origin used when handing out receipt URLs.
    pub base_url: String,
    pub payment_link_base: String,
    pub receipts_dir: String,
    pub effect_queue_capacity: usize,
    pub billing_interval: Duration,
    pub notifier: NotifierKind,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        Self::load(http_addr)
    }

    pub fn worker_from_env() -> Result<Self> {
        Self::load(String::new())
    }

    fn load(http_addr: String) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let base_url = env_or("BASE_URL", DEFAULT_BASE_URL);
        let payment_link_base = env_or("PAYMENT_LINK_BASE", DEFAULT_PAYMENT_LINK_BASE);
        let receipts_dir = env_or("RECEIPTS_DIR", DEFAULT_RECEIPTS_DIR);

        let effect_queue_capacity = parse_env("EFFECT_QUEUE_CAPACITY")?
            .unwrap_or(DEFAULT_EFFECT_QUEUE_CAPACITY);
        let billing_interval_secs: u64 =
            parse_env("BILLING_INTERVAL_SECS")?.unwrap_or(DEFAULT_BILLING_INTERVAL_SECS);
        if billing_interval_secs == 0 {
            anyhow::bail!("BILLING_INTERVAL_SECS must be greater than zero");
        }
        let notifier = env_or("NOTIFIER", "redis")
            .parse()
            .context("NOTIFIER must be `redis` or `log`")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            base_url: base_url.trim_end_matches('/').to_string(),
            payment_link_base: payment_link_base.trim_end_matches('/').to_string(),
            receipts_dir,
            effect_queue_capacity,
            billing_interval: Duration::from_secs(billing_interval_secs),
            notifier,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        _ => Ok(None),
    }
}
