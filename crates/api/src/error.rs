use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use powerwatch_events::BrokerError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The live event broker has stopped; no new streams can be opened.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A response body could not be serialized.
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Rejecting request, service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Encoding(err) => {
                tracing::error!(error = %err, "Response encoding failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENCODING_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
