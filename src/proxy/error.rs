//! Proxy error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// An upstream API key is not configured.
    #[error("Missing {0}")]
    MissingKey(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream answered with a non-success status, passed through as-is.
    #[error("{message} ({status})")]
    Upstream { status: StatusCode, message: String },

    /// Upstream unreachable or returned something unusable.
    #[error("{message}: {details}")]
    Internal { message: String, details: String },
}

impl ProxyError {
    pub fn internal(message: &str, details: impl ToString) -> Self {
        Self::Internal {
            message: message.to_string(),
            details: details.to_string(),
        }
    }

    pub fn upstream(status: reqwest::StatusCode, message: &str) -> Self {
        Self::Upstream {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            message: message.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        warn!("Request failed: {self}");
        let (status, error, details) = match self {
            Self::MissingKey(name) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Missing {name}"),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::Upstream { status, message } => (status, message, None),
            Self::Internal { message, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message, Some(details))
            }
        };
        (status, Json(ErrorBody { error, details })).into_response()
    }
}
