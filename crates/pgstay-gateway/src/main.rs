mod routes;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use pgstay_billing::{EffectQueue, EffectWorker};
use pgstay_platform::{
    Collaborators, PgTenancyStore, RedisBus, ServiceConfig, apply_schema, connect_database,
};
use tracing::info;

use crate::routes::{AppState, router};

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pgstay_gateway=info,pgstay_billing=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
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

    let state = AppState {
        store: Arc::new(PgTenancyStore::new(pool)),
        effects,
        receipts_dir: config.receipts_dir.clone().into(),
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
