//! Error types for the forwarding proxy.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Startup configuration errors. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid upstream URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported upstream scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("Bearer token is empty")]
    EmptyToken,

    #[error("Bearer token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("--{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid health path {0:?}: must start with '/' and be a literal path")]
    InvalidHealthPath(String),

    #[error("Invalid forward header name {0:?}")]
    InvalidHeaderName(String),
}

/// Per-request errors, rendered to the caller and never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream did not respond within {}s", .0.as_secs_f64())]
    UpstreamTimeout(Duration),
}

impl ProxyError {
    /// Classify a transport error from the upstream client.
    pub fn from_upstream(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProxyError::UpstreamTimeout(timeout)
        } else if err.is_builder() {
            ProxyError::BadRequest(err.to_string())
        } else {
            ProxyError::UpstreamUnavailable(error_chain(&err))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ProxyError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
        }
    }
}

/// reqwest hides the interesting part ("connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
            code: &'static str,
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };

        (self.status(), axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body() {
        let response = ProxyError::UpstreamTimeout(Duration::from_millis(1500)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "UPSTREAM_TIMEOUT");
        assert_eq!(json["error"], "Upstream did not respond within 1.5s");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::UpstreamUnavailable("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
