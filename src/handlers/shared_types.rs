use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Envelope for data API responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub count: Option<i64>,
}

impl<T> DataResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            count: None,
        }
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }
}

impl<T> IntoResponse for DataResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Handler error rendered as `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap a backend failure with what was being attempted.
    pub fn internal(action: &str, err: anyhow::Error) -> Self {
        // ---
        tracing::error!("{action} failed: {err:#}");
        Self::Internal(format!("Failed to {action}: {err}"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}
