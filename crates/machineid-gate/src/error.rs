//! Error types for the device gate.

use std::time::Duration;

use crate::config::ConfigError;

/// Errors produced while talking to the device authority.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("request timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response (status {status}): {body}")]
    MalformedResponse { status: u16, body: String },

    #[error("server error (status {status}): {message}")]
    Server {
        status: u16,
        message: String,
        /// Parsed JSON body, when the server sent one.
        body: Option<serde_json::Value>,
    },
}

impl GateError {
    /// Returns a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::TransportTimeout(_) => "transport_timeout",
            Self::Transport(_) => "transport_error",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Server { .. } => "server_error",
        }
    }

    /// HTTP status attached to this error, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::MalformedResponse { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a retry might reasonably succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx responses are transient.
    /// Configuration errors, malformed bodies and 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportTimeout(_) | Self::Transport(_) => true,
            Self::Server { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) | Self::MalformedResponse { .. } => false,
        }
    }
}

impl GateError {
    /// Convert a reqwest failure, recording the deadline that was exceeded.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            GateError::TransportTimeout(timeout)
        } else if e.is_connect() {
            GateError::Transport(format!("connection failed: {e}"))
        } else {
            GateError::Transport(e.to_string())
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server(status: u16) -> GateError {
        GateError::Server {
            status,
            message: "boom".into(),
            body: None,
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GateError::Config(ConfigError::MissingVar("X".into())).error_code(),
            "config_error"
        );
        assert_eq!(
            GateError::TransportTimeout(Duration::from_secs(10)).error_code(),
            "transport_timeout"
        );
        assert_eq!(
            GateError::Transport("refused".into()).error_code(),
            "transport_error"
        );
        assert_eq!(
            GateError::MalformedResponse {
                status: 200,
                body: "<html>".into()
            }
            .error_code(),
            "malformed_response"
        );
        assert_eq!(server(500).error_code(), "server_error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(GateError::TransportTimeout(Duration::from_secs(1)).is_transient());
        assert!(GateError::Transport("reset".into()).is_transient());
        assert!(server(500).is_transient());
        assert!(server(503).is_transient());
        assert!(server(429).is_transient());

        assert!(!server(400).is_transient());
        assert!(!server(401).is_transient());
        assert!(!server(403).is_transient());
        assert!(!GateError::MalformedResponse {
            status: 200,
            body: String::new()
        }
        .is_transient());
        assert!(!GateError::Config(ConfigError::MissingVar("X".into())).is_transient());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(server(502).http_status(), Some(502));
        assert_eq!(
            GateError::MalformedResponse {
                status: 200,
                body: String::new()
            }
            .http_status(),
            Some(200)
        );
        assert_eq!(GateError::Transport("x".into()).http_status(), None);
    }

    #[test]
    fn test_error_display() {
        let err = GateError::MalformedResponse {
            status: 502,
            body: "Bad Gateway".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed response (status 502): Bad Gateway"
        );

        assert_eq!(
            server(403).to_string(),
            "server error (status 403): boom"
        );
    }
}
