//! gpumesh-api: HTTP surface of the gpumesh coordinator.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/register` | Register or replace a worker |
//! | POST | `/heartbeat/{id}` | Refresh a worker (self-registers unknown ids) |
//! | GET | `/clients` | Active workers plus total record count |
//! | GET | `/clients/{id}` | One worker record |
//! | DELETE | `/clients/{id}` | Deregister a worker |
//! | POST | `/predict` | Dispatch an inference request |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Handlers extract `ConnectInfo<SocketAddr>`, so the router must be
//! served with `into_make_service_with_connect_info::<SocketAddr>()`.

pub mod error;
pub mod handlers;
pub mod prometheus;

use std::any::Any;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use gpumesh_core::MeshConfig;
use gpumesh_dispatch::Dispatcher;
use gpumesh_registry::Registry;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Registry,
    pub dispatcher: Dispatcher,
    /// Port assumed for workers that self-register via heartbeat.
    pub default_worker_port: u16,
}

impl ApiState {
    pub fn new(registry: Registry, dispatcher: Dispatcher, default_worker_port: u16) -> Self {
        Self {
            registry,
            dispatcher,
            default_worker_port,
        }
    }

    /// Fresh registry and dispatcher wired from configuration.
    pub fn from_config(config: &MeshConfig) -> Self {
        let registry = Registry::new(config.registry.heartbeat_timeout);
        let dispatcher = Dispatcher::new(registry.clone(), &config.dispatch);
        Self::new(registry, dispatcher, config.registry.default_worker_port)
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/heartbeat/{id}", post(handlers::heartbeat))
        .route("/clients", get(handlers::list_clients))
        .route(
            "/clients/{id}",
            get(handlers::get_client).delete(handlers::remove_client),
        )
        .route("/predict", post(handlers::predict))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state);

    with_middleware(routes)
}

fn with_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// A panicking handler becomes a generic 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");
    ApiError::Internal("internal server error".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> (Router, ApiState) {
        let state = ApiState::from_config(&MeshConfig::default());
        let router = build_router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([10, 1, 2, 3], 5555))));
        (router, state)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn register_then_fetch() {
        let (app, _) = app();

        let resp = app
            .clone()
            .oneshot(post_json(
                "/register",
                r#"{"client_id": "w1", "ip_address": "10.0.0.1", "port": 9000,
                    "gpu_info": {"device_name": "RTX4090", "total_memory": 24}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "success");

        let resp = app
            .oneshot(Request::get("/clients/w1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["client_id"], "w1");
        assert_eq!(body["gpu_info"]["device_name"], "RTX4090");
    }

    #[tokio::test]
    async fn malformed_registration_is_400_json() {
        let (app, _) = app();
        let resp = app.oneshot(post_json("/register", r#"{"ip_address": 7}"#)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn heartbeat_uses_peer_address() {
        let (app, state) = app();
        let resp = app
            .oneshot(post_json("/heartbeat/ghost", r#"{"loaded_models": []}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let w = state.registry.get_by_id("ghost").await.unwrap();
        assert_eq!(w.endpoint(), "10.1.2.3:8000");
    }

    #[tokio::test]
    async fn unknown_client_is_404_json() {
        let (app, _) = app();
        let resp = app
            .oneshot(Request::get("/clients/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"status": "error", "detail": "Client not found"})
        );
    }

    #[tokio::test]
    async fn delete_absent_client_succeeds() {
        let (app, _) = app();
        let resp = app
            .oneshot(Request::delete("/clients/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn predict_with_no_workers_is_503() {
        let (app, _) = app();
        let resp = app
            .oneshot(post_json("/predict", r#"{"model_type": "sdxl", "model_cid": "Qm1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["status"], "error");
    }

    async fn explode() -> StatusCode {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_500_json() {
        let app = with_middleware(Router::new().route("/boom", get(explode)));
        let resp = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["detail"], "internal server error");
    }
}
