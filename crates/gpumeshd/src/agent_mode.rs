//! Agent mode: runs beside a worker's inference server.
//!
//! Registers the worker, heartbeats until Ctrl-C, then deregisters.

use gpumesh_agent::{AgentConfig, WorkerAgent};
use tokio::sync::watch;
use tracing::info;

pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    config.validate()?;
    let agent = WorkerAgent::new(config);
    info!(worker_id = %agent.worker_id(), "gpumesh agent starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    handle.await??;
    info!("gpumesh agent stopped");
    Ok(())
}
