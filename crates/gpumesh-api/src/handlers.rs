//! HTTP handlers.
//!
//! Registry handlers answer `{"status": "success", "message": ...}`;
//! `/predict` relays the worker's response as-is.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use gpumesh_dispatch::PredictRequest;
use gpumesh_registry::{UpdateContext, UpdateOutcome, Worker, WorkerUpdate};
use serde::Serialize;
use tracing::{debug, info};

use crate::ApiState;
use crate::error::{ApiError, ApiJson};
use crate::prometheus::{WorkerGauges, render_prometheus};

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

fn success(message: impl Into<String>) -> Json<StatusMessage> {
    Json(StatusMessage {
        status: "success",
        message: message.into(),
    })
}

#[derive(Debug, Serialize)]
pub struct ClientList<'a> {
    pub active_clients: Vec<&'a Worker>,
    pub total_clients: usize,
}

// ── Registry ───────────────────────────────────────────────────

/// POST /register
///
/// `last_heartbeat` is stamped with receipt time; worker clocks are
/// not trusted for liveness.
pub async fn register(
    State(state): State<ApiState>,
    ApiJson(mut worker): ApiJson<Worker>,
) -> Result<Json<StatusMessage>, ApiError> {
    worker
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    worker.last_heartbeat = Utc::now();

    let id = worker.id.clone();
    state.registry.register(worker).await;
    Ok(success(format!("Client {id} registered")))
}

/// POST /heartbeat/{id}
///
/// An empty body is a bare liveness ping. Heartbeats from unknown ids
/// register the worker at the request's source address. Receipt time
/// becomes the new `last_heartbeat`.
pub async fn heartbeat(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<StatusMessage>, ApiError> {
    let mut update: WorkerUpdate = if body.iter().all(u8::is_ascii_whitespace) {
        WorkerUpdate::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    update.last_heartbeat = Some(Utc::now());

    let ctx = UpdateContext {
        source_ip: peer.ip(),
        default_port: state.default_worker_port,
    };
    let outcome = state
        .registry
        .update(&id, update, &ctx)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let message = match outcome {
        UpdateOutcome::Merged => "Heartbeat received".to_string(),
        UpdateOutcome::Registered => format!("Client {id} registered via heartbeat"),
    };
    Ok(success(message))
}

/// GET /clients
///
/// Lists active workers and kicks off a background sweep.
pub async fn list_clients(State(state): State<ApiState>) -> Response {
    let active = state.registry.list_active().await;
    let total = state.registry.len().await;
    state.registry.spawn_sweep();

    debug!(active = active.len(), total, "listing clients");
    let body = ClientList {
        active_clients: active.iter().map(|w| w.as_ref()).collect(),
        total_clients: total,
    };
    Json(body).into_response()
}

/// GET /clients/{id}
pub async fn get_client(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Worker>, ApiError> {
    state
        .registry
        .get_by_id(&id)
        .await
        .map(|w| Json(w.as_ref().clone()))
        .ok_or_else(|| ApiError::NotFound("Client not found".to_string()))
}

/// DELETE /clients/{id}
///
/// Succeeds whether or not the worker was registered.
pub async fn remove_client(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Json<StatusMessage> {
    state.registry.remove(&id).await;
    success(format!("Client {id} removed"))
}

// ── Inference ──────────────────────────────────────────────────

/// POST /predict
pub async fn predict(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let request = PredictRequest::from_bytes(body)?;
    let resp = state.dispatcher.dispatch(&request).await?;

    info!(
        worker_id = %resp.worker_id,
        model = %request.model(),
        bytes = resp.body.len(),
        "relaying worker response"
    );
    let content_type = resp
        .content_type
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    Ok((resp.status, [(CONTENT_TYPE, content_type)], resp.body).into_response())
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let gauges = WorkerGauges {
        registered: state.registry.len().await,
        active: state.registry.list_active().await.len(),
    };
    let body = render_prometheus(&state.dispatcher.stats().snapshot(), gauges);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
