//! Request dispatcher.
//!
//! One request walks through at most four phases:
//!
//! ```text
//! Selecting ──► Forwarding ──► success
//!                   │
//!                   ▼ (non-2xx, unreachable, timeout)
//!           RetrySelecting ──► RetryForwarding ──► success | failure
//! ```
//!
//! There is exactly one retry cycle. A selection that finds no worker in
//! the first phase fails immediately. No registry lock is held while a
//! forward is in flight; the selected worker is an immutable snapshot.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gpumesh_core::{DispatchConfig, HttpClient, HttpError};
use gpumesh_registry::{Registry, Worker, WorkerId};
use http::{HeaderValue, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, DispatchResult};
use crate::payload::PredictRequest;
use crate::selector::{self, Selection};
use crate::source::WorkerSource;
use crate::stats::DispatchStats;

/// Upper bound on how much of a worker's error body ends up in `detail`.
const MAX_DETAIL_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Selecting,
    Forwarding,
    RetrySelecting,
    RetryForwarding,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchPhase::Selecting => "selecting",
            DispatchPhase::Forwarding => "forwarding",
            DispatchPhase::RetrySelecting => "retry_selecting",
            DispatchPhase::RetryForwarding => "retry_forwarding",
        };
        f.write_str(s)
    }
}

/// A worker's successful reply, relayed unmodified.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub worker_id: WorkerId,
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
    /// Forward attempts made, 1 or 2.
    pub attempts: u8,
}

/// Selects a worker for each request and forwards the payload to it.
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn WorkerSource>,
    client: HttpClient,
    selection_timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(registry: Registry, config: &DispatchConfig) -> Self {
        Self::with_client(
            registry,
            HttpClient::new(config.forward_timeout),
            config.selection_timeout,
        )
    }

    pub fn with_client(registry: Registry, client: HttpClient, selection_timeout: Duration) -> Self {
        Self::with_source(Arc::new(registry), client, selection_timeout)
    }

    pub fn with_source(
        source: Arc<dyn WorkerSource>,
        client: HttpClient,
        selection_timeout: Duration,
    ) -> Self {
        Self {
            source,
            client,
            selection_timeout,
            stats: Arc::new(DispatchStats::new()),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Serve `request` on the best available worker, retrying once on
    /// another worker (or the same one, if it is the only candidate).
    pub async fn dispatch(&self, request: &PredictRequest) -> DispatchResult<WorkerResponse> {
        self.stats.record_request();
        let result = self.run(request).await;
        match &result {
            Ok(resp) => {
                self.stats.record_success();
                info!(
                    worker_id = %resp.worker_id,
                    model = %request.model(),
                    attempts = resp.attempts,
                    "request served"
                );
            }
            Err(e) => {
                self.stats.record_failure();
                match e {
                    DispatchError::NoSuitableWorker(_) => self.stats.record_no_worker(),
                    DispatchError::SelectionTimeout(_) => self.stats.record_selection_timeout(),
                    DispatchError::ForwardTimeout { .. } => self.stats.record_forward_timeout(),
                    _ => {}
                }
                warn!(model = %request.model(), error = %e, "request failed");
            }
        }
        result
    }

    async fn run(&self, request: &PredictRequest) -> DispatchResult<WorkerResponse> {
        let model = request.model();
        let body = request.to_forward_body()?;

        let first = self.select(model, None, DispatchPhase::Selecting).await?;
        let first_err = match self.forward(&first.worker, body.clone(), DispatchPhase::Forwarding).await {
            Ok(mut resp) => {
                resp.attempts = 1;
                return Ok(resp);
            }
            Err(e) => e,
        };

        self.stats.record_retry();
        let failed_id = first.worker.id.clone();
        warn!(
            worker_id = %failed_id,
            error = %first_err,
            "forward failed, reselecting"
        );

        let second = match self.select(model, Some(&failed_id), DispatchPhase::RetrySelecting).await {
            Ok(sel) => sel,
            Err(e) => {
                debug!(error = %e, "reselection found no worker");
                return Err(first_err);
            }
        };

        let mut resp = self
            .forward(&second.worker, body, DispatchPhase::RetryForwarding)
            .await?;
        resp.attempts = 2;
        Ok(resp)
    }

    /// Pick a worker within the selection timeout.
    async fn select(
        &self,
        model: &str,
        failed: Option<&str>,
        phase: DispatchPhase,
    ) -> DispatchResult<Selection> {
        let pick = async {
            let active = self.source.active_workers().await;
            match failed {
                Some(failed) => selector::reselect(&active, model, failed),
                None => selector::select(&active, model),
            }
        };

        let selection = tokio::time::timeout(self.selection_timeout, pick)
            .await
            .map_err(|_| DispatchError::SelectionTimeout(self.selection_timeout))?
            .ok_or_else(|| DispatchError::NoSuitableWorker(model.to_string()))?;

        debug!(
            %phase,
            worker_id = %selection.worker.id,
            reason = %selection.reason,
            model,
            "worker selected"
        );
        Ok(selection)
    }

    async fn forward(
        &self,
        worker: &Worker,
        body: Bytes,
        phase: DispatchPhase,
    ) -> DispatchResult<WorkerResponse> {
        let url = worker.predict_url();
        debug!(%phase, worker_id = %worker.id, %url, "forwarding request");

        let resp = self.client.post_json(&url, body).await.map_err(|e| match e {
            HttpError::Timeout(timeout) => DispatchError::ForwardTimeout {
                worker_id: worker.id.clone(),
                timeout,
            },
            other => DispatchError::ForwardFailure {
                worker_id: worker.id.clone(),
                status: None,
                detail: other.to_string(),
            },
        })?;

        if !resp.is_success() {
            return Err(DispatchError::ForwardFailure {
                worker_id: worker.id.clone(),
                status: Some(resp.status.as_u16()),
                detail: error_detail(&resp.body, resp.status),
            });
        }

        Ok(WorkerResponse {
            worker_id: worker.id.clone(),
            status: resp.status,
            content_type: resp.content_type,
            body: resp.body,
            attempts: 0,
        })
    }
}

/// Best human-readable reason from a worker's error body: its `detail`
/// field when the body is JSON, otherwise the (truncated) text.
fn error_detail(body: &[u8], status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return match detail.as_str() {
                Some(s) => s.to_string(),
                None => detail.to_string(),
            };
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("worker returned {status}");
    }
    match text.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::routing::post;
    use gpumesh_registry::GpuInfo;

    /// Fake worker answering `/predict` with a fixed status and body.
    /// Counts hits and keeps every request body it receives.
    async fn fake_worker(status: u16, body: &'static str, delay: Duration) -> (u16, Arc<AtomicUsize>) {
        let (port, hits, _) = recording_worker(status, body, delay).await;
        (port, hits)
    }

    async fn recording_worker(
        status: u16,
        body: &'static str,
        delay: Duration,
    ) -> (u16, Arc<AtomicUsize>, Arc<Mutex<Vec<Bytes>>>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let counter = hits.clone();
        let seen = received.clone();
        let app = Router::new().route(
            "/predict",
            post(move |request: Bytes| {
                let counter = counter.clone();
                let seen = seen.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    seen.lock().unwrap().push(request);
                    tokio::time::sleep(delay).await;
                    (
                        StatusCode::from_u16(status).unwrap(),
                        [("content-type", "application/json")],
                        body,
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, hits, received)
    }

    /// Source whose listing never completes.
    struct StalledSource;

    impl WorkerSource for StalledSource {
        fn active_workers(&self) -> crate::source::ActiveWorkersFuture<'_> {
            Box::pin(std::future::pending())
        }
    }

    fn worker(id: &str, port: u16, models: &[&str]) -> Worker {
        let mut w = Worker::new(id, "127.0.0.1", port);
        w.loaded_models = models.iter().map(|m| m.to_string()).collect();
        w.gpu_info = GpuInfo {
            device_name: "RTX4090".to_string(),
            total_memory: 24.0,
            ..GpuInfo::default()
        };
        w
    }

    fn dispatcher(registry: Registry, forward_timeout: Duration) -> Dispatcher {
        Dispatcher::with_client(registry, HttpClient::new(forward_timeout), Duration::from_secs(2))
    }

    fn request(model: &str) -> PredictRequest {
        PredictRequest::from_slice(
            format!(r#"{{"model_type": "{model}", "model_cid": "Qm1", "prompt": "a cat"}}"#).as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn relays_worker_response_unmodified() {
        let (port, hits) = fake_worker(200, r#"{"result": "ok", "image": "abc"}"#, Duration::ZERO).await;
        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("w1", port, &["sdxl"])).await;

        let d = dispatcher(registry, Duration::from_secs(5));
        let resp = d.dispatch(&request("sdxl")).await.unwrap();

        assert_eq!(resp.worker_id, "w1");
        assert_eq!(resp.attempts, 1);
        assert_eq!(&resp.body[..], br#"{"result": "ok", "image": "abc"}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(d.stats().snapshot().successes, 1);
    }

    #[tokio::test]
    async fn empty_registry_is_no_suitable_worker() {
        let d = dispatcher(Registry::new(Duration::from_secs(30)), Duration::from_secs(5));
        let err = d.dispatch(&request("sdxl")).await.unwrap_err();

        assert!(matches!(err, DispatchError::NoSuitableWorker(ref m) if m == "sdxl"));
        let snap = d.stats().snapshot();
        assert_eq!(snap.no_worker, 1);
        assert_eq!(snap.retries, 0);
    }

    #[tokio::test]
    async fn upstream_500_retries_exactly_once() {
        let (port, hits) = fake_worker(500, r#"{"detail": "CUDA out of memory"}"#, Duration::ZERO).await;
        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("w1", port, &["sdxl"])).await;

        let d = dispatcher(registry, Duration::from_secs(5));
        let err = d.dispatch(&request("sdxl")).await.unwrap_err();

        match err {
            DispatchError::ForwardFailure { status, detail, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(detail, "CUDA out of memory");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(d.stats().snapshot().retries, 1);
    }

    #[tokio::test]
    async fn retry_fails_over_to_another_worker() {
        let (bad_port, bad_hits) = fake_worker(503, "overloaded", Duration::ZERO).await;
        let (good_port, good_hits) = fake_worker(200, r#"{"ok": true}"#, Duration::ZERO).await;

        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("a-bad", bad_port, &["sdxl"])).await;
        registry.register(worker("b-good", good_port, &[])).await;

        let d = dispatcher(registry, Duration::from_secs(5));
        let resp = d.dispatch(&request("sdxl")).await.unwrap();

        assert_eq!(resp.worker_id, "b-good");
        assert_eq!(resp.attempts, 2);
        assert_eq!(bad_hits.load(Ordering::SeqCst), 1);
        assert_eq!(good_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_worker_fails_without_status() {
        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("w1", 1, &["sdxl"])).await;

        let d = dispatcher(registry, Duration::from_secs(2));
        let err = d.dispatch(&request("sdxl")).await.unwrap_err();

        assert!(err.is_forward_error());
        if let DispatchError::ForwardFailure { status, .. } = err {
            assert_eq!(status, None);
        }
        assert_eq!(d.stats().snapshot().retries, 1);
    }

    #[tokio::test]
    async fn slow_worker_is_forward_timeout() {
        let (port, hits) = fake_worker(200, "{}", Duration::from_millis(500)).await;
        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("w1", port, &["sdxl"])).await;

        let d = dispatcher(registry, Duration::from_millis(100));
        let err = d.dispatch(&request("sdxl")).await.unwrap_err();

        assert!(matches!(err, DispatchError::ForwardTimeout { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(d.stats().snapshot().forward_timeouts, 1);
    }

    #[tokio::test]
    async fn worker_receives_the_request_bytes_unchanged() {
        let (port, _, received) = recording_worker(200, "{}", Duration::ZERO).await;
        let registry = Registry::new(Duration::from_secs(30));
        registry.register(worker("w1", port, &["sdxl"])).await;

        let raw: &[u8] = br#"{"model_type": "sdxl", "model_cid": "Qm1", "prompt": null,
            "inference_steps": 30.0, "guidance_scale": "7.5"}"#;
        let d = dispatcher(registry, Duration::from_secs(5));
        d.dispatch(&PredictRequest::from_slice(raw).unwrap()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(&received[0][..], raw);
    }

    #[tokio::test]
    async fn stalled_selection_is_selection_timeout() {
        let d = Dispatcher::with_source(
            Arc::new(StalledSource),
            HttpClient::new(Duration::from_secs(5)),
            Duration::from_millis(50),
        );
        let err = d.dispatch(&request("sdxl")).await.unwrap_err();

        assert!(matches!(err, DispatchError::SelectionTimeout(t) if t == Duration::from_millis(50)));
        let snap = d.stats().snapshot();
        assert_eq!(snap.selection_timeouts, 1);
        assert_eq!(snap.retries, 0);
    }

    #[test]
    fn error_detail_prefers_json_detail() {
        assert_eq!(error_detail(br#"{"detail": "bad prompt"}"#, StatusCode::BAD_REQUEST), "bad prompt");
        assert_eq!(error_detail(b"plain failure", StatusCode::BAD_GATEWAY), "plain failure");
        assert_eq!(
            error_detail(b"", StatusCode::INTERNAL_SERVER_ERROR),
            "worker returned 500 Internal Server Error"
        );

        let long = "x".repeat(MAX_DETAIL_LEN + 10);
        assert_eq!(error_detail(long.as_bytes(), StatusCode::BAD_GATEWAY).len(), MAX_DETAIL_LEN + 3);
    }
}
