//! Server assembly: wire vault, index, reconciler, watcher, broker, and the
//! HTTP transport together, with graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch as watch_channel;

use crate::api::{self, AppState};
use crate::broker::{Broker, DEFAULT_GRAPH_THROTTLE};
use crate::config::Config;
use crate::index::Index;
use crate::reconcile;
use crate::service::NoteService;
use crate::vault::Vault;
use crate::watch;

/// Build the shared components: vault, index, and the service over them.
/// The initial reconciliation sweep runs here, before any request or
/// watcher event can observe the index.
pub async fn build_service(config: &Config) -> Result<(Arc<Vault>, Arc<Index>, Arc<NoteService>)> {
    std::fs::create_dir_all(&config.vault.path)
        .with_context(|| format!("create vault dir {}", config.vault.path.display()))?;

    let vault = Arc::new(Vault::open(&config.vault.path).context("open vault")?);
    let index = Arc::new(Index::open(&config.sqlite.path).await.context("open index")?);

    if let Err(e) = reconcile::sync(&vault, &index).await {
        tracing::warn!(error = %e, "initial sync failed");
    }

    let service = Arc::new(NoteService::new(Arc::clone(&vault), Arc::clone(&index)));
    Ok((vault, index, service))
}

/// Run the HTTP server until ctrl-c, then drain the watcher and broker.
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(
        port = config.http.port,
        vault = %config.vault.path.display(),
        sqlite = %config.sqlite.path.display(),
        auth = config.auth.enabled(),
        "configuration loaded"
    );

    let (vault, index, service) = build_service(&config).await?;

    let broker = Broker::new(DEFAULT_GRAPH_THROTTLE);
    let (shutdown_tx, shutdown_rx) = watch_channel::channel(false);

    let watcher = tokio::spawn(watch::run(
        Arc::clone(&vault),
        Arc::clone(&index),
        broker.clone(),
        shutdown_rx,
    ));

    let state = AppState {
        service,
        broker: broker.clone(),
        auth: Arc::new(config.auth.clone()),
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop background tasks: watcher first (it may still publish), then the
    // broker, then checkpoint the index.
    let _ = shutdown_tx.send(true);
    if let Err(e) = watcher.await {
        tracing::warn!(error = %e, "watcher task join failed");
    }
    broker.close();
    index.close().await;

    tracing::info!("server stopped");
    Ok(())
}
