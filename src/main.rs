use anomaly_service::{
    config::AppConfig,
    http, metrics_server, observability,
    store::{ConnectionManager, MongoReadingStore, ReadingStore},
};
use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::serve(&metrics_cfg.bind_addr)?;
    }

    // The connection is established lazily on the first request; the manager
    // serializes concurrent first attempts.
    let manager = Arc::new(ConnectionManager::new(cfg.mongodb.clone()));
    let store: Arc<dyn ReadingStore> = Arc::new(MongoReadingStore::new(
        manager,
        &cfg.mongodb.collection,
        Duration::from_millis(cfg.mongodb.operation_timeout_ms),
    ));

    let app = http::router(store);

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "anomaly service listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
