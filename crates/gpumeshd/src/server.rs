//! Coordinator mode: registry, dispatcher, and HTTP API in one process.
//!
//! 1. Build the registry and dispatcher from configuration
//! 2. Start the periodic sweeper
//! 3. Serve the API until Ctrl-C, then stop the sweeper

use std::net::SocketAddr;

use gpumesh_api::{ApiState, build_router};
use gpumesh_core::MeshConfig;
use gpumesh_registry::Sweeper;
use tokio::sync::watch;
use tracing::info;

pub async fn run_server(config: MeshConfig) -> anyhow::Result<()> {
    info!("gpumesh coordinator starting");

    let state = ApiState::from_config(&config);
    info!(
        heartbeat_timeout = ?config.registry.heartbeat_timeout,
        selection_timeout = ?config.dispatch.selection_timeout,
        forward_timeout = ?config.dispatch.forward_timeout,
        "registry and dispatcher initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background sweeper ─────────────────────────────────────

    let sweeper = Sweeper::new(state.registry.clone(), config.registry.sweep_interval);
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    // ── API server ─────────────────────────────────────────────

    let router = build_router(state);
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "API server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    let _ = sweeper_handle.await;

    info!("gpumesh coordinator stopped");
    Ok(())
}
