//! Worker agent: the worker side of the membership protocol.
//!
//! Registers with the coordinator, heartbeats on a fixed interval, and
//! deregisters on shutdown. Heartbeat failures are logged and retried
//! on the next tick; the coordinator re-registers a worker from its
//! heartbeat if it has forgotten it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use gpumesh_core::{HttpClient, HttpResponse};
use gpumesh_registry::{Worker, WorkerStatus, WorkerUpdate};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

/// Supplies the currently loaded models on every heartbeat.
pub type ModelSource = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

pub struct WorkerAgent {
    config: AgentConfig,
    worker_id: String,
    client: HttpClient,
    models: Option<ModelSource>,
}

impl WorkerAgent {
    pub fn new(config: AgentConfig) -> Self {
        let worker_id = config.resolve_worker_id();
        let client = HttpClient::new(config.request_timeout);
        Self {
            config,
            worker_id,
            client,
            models: None,
        }
    }

    /// Report models from `source` instead of the static config list.
    pub fn with_model_source(mut self, source: ModelSource) -> Self {
        self.models = Some(source);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.config.heartbeat_interval
    }

    fn loaded_models(&self) -> Vec<String> {
        match &self.models {
            Some(source) => source(),
            None => self.config.loaded_models.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.server_url.trim_end_matches('/'))
    }

    /// Full registration record for this worker.
    pub fn record(&self) -> Worker {
        Worker {
            id: self.worker_id.clone(),
            ip_address: self.config.advertise_host.clone(),
            port: self.config.port,
            gpu_info: self.config.gpu_info.clone(),
            loaded_models: self.loaded_models(),
            last_heartbeat: Utc::now(),
            status: WorkerStatus::Active,
            capabilities: self.config.capabilities.clone(),
        }
    }

    /// POST /register with the full record.
    pub async fn register(&self) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&self.record())?;
        let resp = self
            .client
            .post_json(&self.url("/register"), Bytes::from(body))
            .await
            .context("registration request failed")?;
        ensure_success(&resp, "registration")?;

        info!(
            worker_id = %self.worker_id,
            server = %self.config.server_url,
            "registered with coordinator"
        );
        Ok(())
    }

    /// POST /heartbeat/{id} with the current models, status, and GPU info.
    pub async fn heartbeat(&self) -> anyhow::Result<()> {
        let update = WorkerUpdate {
            gpu_info: Some(self.config.gpu_info.clone()),
            loaded_models: Some(self.loaded_models()),
            last_heartbeat: Some(Utc::now()),
            status: Some(WorkerStatus::Active),
            ..WorkerUpdate::default()
        };
        let body = serde_json::to_vec(&update)?;
        let resp = self
            .client
            .post_json(&self.url(&format!("/heartbeat/{}", self.worker_id)), Bytes::from(body))
            .await
            .context("heartbeat request failed")?;
        ensure_success(&resp, "heartbeat")?;

        debug!(worker_id = %self.worker_id, "heartbeat sent");
        Ok(())
    }

    /// DELETE /clients/{id}.
    pub async fn leave(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .delete(&self.url(&format!("/clients/{}", self.worker_id)))
            .await
            .context("deregistration request failed")?;
        ensure_success(&resp, "deregistration")?;

        info!(worker_id = %self.worker_id, "deregistered from coordinator");
        Ok(())
    }

    /// Register, then heartbeat until shutdown, then deregister.
    ///
    /// Registration is retried every interval until it succeeds.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            worker_id = %self.worker_id,
            interval = ?self.config.heartbeat_interval,
            "agent loop started"
        );

        let mut registered = false;
        loop {
            if *shutdown.borrow() {
                break;
            }

            if !registered {
                match self.register().await {
                    Ok(()) => registered = true,
                    Err(e) => warn!(worker_id = %self.worker_id, error = %e, "registration failed, will retry"),
                }
            } else if let Err(e) = self.heartbeat().await {
                warn!(worker_id = %self.worker_id, error = %e, "heartbeat failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                _ = shutdown.changed() => {
                    info!(worker_id = %self.worker_id, "agent loop shutting down");
                    break;
                }
            }
        }

        if registered {
            if let Err(e) = self.leave().await {
                warn!(worker_id = %self.worker_id, error = %e, "deregistration failed");
            }
        }
        Ok(())
    }
}

fn ensure_success(resp: &HttpResponse, what: &str) -> anyhow::Result<()> {
    if resp.is_success() {
        return Ok(());
    }
    anyhow::bail!("{what} rejected with {}: {}", resp.status, resp.body_text())
}
