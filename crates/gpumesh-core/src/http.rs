//! Minimal JSON-over-HTTP/1 client.
//!
//! Wraps hyper's pooled legacy client with a per-request deadline that
//! covers connect, send, and reading the full response body.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::{HttpError, HttpResult};

const USER_AGENT_VALUE: &str = concat!("gpumesh/", env!("CARGO_PKG_VERSION"));

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as lossy UTF-8, for log lines and error details.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Cloneable HTTP client with a fixed request timeout.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let inner = Client::builder(TokioExecutor::new()).build_http();
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST a JSON body.
    pub async fn post_json(&self, url: &str, body: Bytes) -> HttpResult<HttpResponse> {
        let req = build_request(Method::POST, url, Some(body))?;
        self.send(req).await
    }

    pub async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        let req = build_request(Method::GET, url, None)?;
        self.send(req).await
    }

    pub async fn delete(&self, url: &str) -> HttpResult<HttpResponse> {
        let req = build_request(Method::DELETE, url, None)?;
        self.send(req).await
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> HttpResult<HttpResponse> {
        let uri = req.uri().clone();
        let exchange = async {
            let resp = self
                .inner
                .request(req)
                .await
                .map_err(|e| HttpError::Transport(error_chain(&e)))?;
            let (parts, body) = resp.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| HttpError::Transport(error_chain(&e)))?
                .to_bytes();
            Ok(HttpResponse {
                status: parts.status,
                content_type: parts.headers.get(CONTENT_TYPE).cloned(),
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => {
                if let Err(ref e) = result {
                    debug!(%uri, error = %e, "http request failed");
                }
                result
            }
            Err(_) => {
                debug!(%uri, timeout = ?self.timeout, "http request timed out");
                Err(HttpError::Timeout(self.timeout))
            }
        }
    }
}

fn build_request(method: Method, url: &str, body: Option<Bytes>) -> HttpResult<Request<Full<Bytes>>> {
    let uri: Uri = url
        .parse()
        .map_err(|e| HttpError::InvalidRequest(format!("{url}: {e}")))?;
    let authority = uri
        .authority()
        .ok_or_else(|| HttpError::InvalidRequest(format!("{url}: missing host")))?
        .to_string();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(HOST, authority)
        .header(USER_AGENT, USER_AGENT_VALUE);
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }

    builder
        .body(Full::new(body.unwrap_or_default()))
        .map_err(|e| HttpError::InvalidRequest(e.to_string()))
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;

    async fn spawn_echo() -> String {
        let app = Router::new().route(
            "/echo",
            post(|body: Bytes| async move {
                ([(CONTENT_TYPE, "application/json")], body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn post_json_reads_full_body() {
        let base = spawn_echo().await;
        let client = HttpClient::new(Duration::from_secs(5));

        let resp = client
            .post_json(&format!("{base}/echo"), Bytes::from_static(br#"{"a":1}"#))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.body_text(), r#"{"a":1}"#);
        assert_eq!(resp.content_type.unwrap(), "application/json");
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let base = spawn_echo().await;
        let client = HttpClient::new(Duration::from_secs(5));

        let resp = client.get(&format!("{base}/missing")).await.unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn closed_port_is_transport_error() {
        let client = HttpClient::new(Duration::from_millis(500));
        let err = client
            .post_json("http://127.0.0.1:1/predict", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport(_) | HttpError::Timeout(_)));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let client = HttpClient::new(Duration::from_secs(1));
        let err = client.get("not a url").await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }
}
