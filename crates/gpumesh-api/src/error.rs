//! API error responses.
//!
//! Every failure leaves the service as `{"status": "error", "detail": ...}`
//! with a status code chosen here and nowhere else.

use axum::Json;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gpumesh_dispatch::DispatchError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    detail: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Dispatch(e) => match e {
                DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                DispatchError::NoSuitableWorker(_) | DispatchError::SelectionTimeout(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                DispatchError::ForwardTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                DispatchError::ForwardFailure {
                    status: Some(code), ..
                } => StatusCode::from_u16(*code)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                DispatchError::ForwardFailure { status: None, .. } | DispatchError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if matches!(self, ApiError::Internal(_) | ApiError::Dispatch(DispatchError::Internal(_))) {
            error!(error = %self, "internal fault");
        }
        let body = ErrorBody {
            status: "error",
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}
