mod auth;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use companies_core::RecordStore;
use companies_memstore::InMemoryRecordStore;
use companies_platform::{
    PgRecordStore, ReadinessPolicy, RedisBus, ServiceConfig, StoreBackend,
    config::DbConfig, connect_database, db, ensure_database, ensure_schema, wait_ready,
};
use companies_records::RecordService;
use sqlx::PgPool;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    auth::TokenAuthority,
    routes::{AppState, router},
};

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "companies_gateway=info,companies_records=info,companies_platform=info,tower_http=info"
                .to_string()
        }))
        .init();

    let config = ServiceConfig::load()?;

    let (store, pool) = open_store(&config.db, config.records.store_backend).await?;

    let bus = RedisBus::connect(&config.bus.redis_url, config.bus.publish_timeout())
        .context("invalid redis url")?;
    wait_ready(
        "redis",
        || bus.ping(),
        ReadinessPolicy::from(&config.bus.readiness),
    )
    .await;

    let records = RecordService::new(store, Arc::new(bus), config.bus.topic.clone())
        .with_update_policy(config.records.update_policy);
    info!(
        topic = records.topic(),
        update_policy = %config.records.update_policy,
        "record service ready"
    );

    let state = AppState {
        records: Arc::new(records),
        auth: Arc::new(TokenAuthority::new(&config.auth)),
    };
    let app = router(state)
        .layer(TimeoutLayer::new(config.http.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.http.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("gateway listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    info!("gateway stopped");

    Ok(())
}

async fn open_store(
    config: &DbConfig,
    backend: StoreBackend,
) -> AnyResult<(Arc<dyn RecordStore>, Option<PgPool>)> {
    match backend {
        StoreBackend::Memory => {
            warn!("using the in-memory record store, records are lost on exit");
            let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
            Ok((store, None))
        }
        StoreBackend::Postgres => {
            wait_ready(
                "postgres",
                || db::ping(config),
                ReadinessPolicy::from(&config.readiness),
            )
            .await;

            ensure_database(config).await?;
            let pool = connect_database(config)
                .await
                .with_context(|| format!("failed to connect to database {}", config.name))?;
            ensure_schema(&pool).await?;

            let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
            Ok((store, Some(pool)))
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!("failed to listen for shutdown signal: {err}");
            std::future::pending::<()>().await;
        }
    }
}
