use anyhow::Result;
use chrono::Utc;
use pgstay_billing::{EffectQueue, EffectWorker, run_billing_cycle};
use pgstay_platform::{
    Collaborators, PgTenancyStore, RedisBus, ServiceConfig, apply_schema, connect_database,
};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pgstay_ops=info,pgstay_billing=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let collaborators = Collaborators::from_config(&config, redis);

    let (effects, receiver) = EffectQueue::bounded(config.effect_queue_capacity);
    let _worker = EffectWorker::new(
        receiver,
        collaborators.links,
        collaborators.notifier,
        collaborators.receipts,
    )
    .spawn();

    let store = PgTenancyStore::new(pool);
    let mut ticker = interval(config.billing_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = config.billing_interval.as_secs(),
        "billing scheduler started"
    );

    loop {
        ticker.tick().await;
        match run_billing_cycle(&store, &effects, Utc::now()).await {
            Ok(summary) if summary.failed > 0 => error!(
                failed = summary.failed,
                billed = summary.billed,
                "billing sweep finished with failures"
            ),
            Ok(_) => {}
            Err(err) => error!("billing sweep failed: {err:#}"),
        }
    }
}
