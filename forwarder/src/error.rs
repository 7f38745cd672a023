//! Error types for the forwarder

use thiserror::Error;

/// Result type alias for forwarder operations
pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Top-level error type
///
/// Only surfaces from startup and wiring code, and from the ingress task when
/// it stops on an unrecoverable credential failure.
#[derive(Error, Debug)]
pub enum ForwarderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential resolution failed
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// gRPC transport error
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// TLS material could not be loaded
    #[error("tls error: {0}")]
    Tls(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// A background task panicked
    #[error("{0} task panicked")]
    Panicked(&'static str),
}

/// Failures resolving the auth server address or exchanging credentials
#[derive(Error, Debug)]
pub enum AuthError {
    /// Info endpoint unreachable or returned a non-success status
    #[error("discovery request failed: {0}")]
    Discovery(String),

    /// Response body could not be parsed
    #[error("unable to decode response: {0}")]
    Decode(String),

    /// Token endpoint unreachable or returned a non-success status
    #[error("token request failed: {0}")]
    AuthRequest(String),

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    Client(String),
}

/// Failure of an upstream or downstream stream operation
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// The server rejected the credential; the token must be refreshed
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The per-stream timeout elapsed
    #[error("stream deadline exceeded")]
    DeadlineExceeded,

    /// The stream was cancelled locally
    #[error("stream cancelled")]
    Cancelled,

    /// The peer ended the stream
    #[error("stream closed by peer")]
    Closed,

    /// Any other transport failure
    #[error("stream error: {0}")]
    Transport(tonic::Status),
}

impl StreamError {
    /// True when the failure requires a token refresh
    pub fn is_authorization_denied(&self) -> bool {
        matches!(self, StreamError::AuthorizationDenied(_))
    }
}

impl From<tonic::Status> for StreamError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::PermissionDenied | tonic::Code::Unauthenticated => {
                StreamError::AuthorizationDenied(status.message().to_string())
            }
            tonic::Code::DeadlineExceeded => StreamError::DeadlineExceeded,
            tonic::Code::Cancelled => StreamError::Cancelled,
            _ => StreamError::Transport(status),
        }
    }
}

/// Event could not be converted to an envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Only heartbeat events are forwarded
    #[error("event type not supported: {0}")]
    UnsupportedEvent(&'static str),
}

/// Envelope was not accepted by the relay queue
#[derive(Error, Debug)]
pub enum RelayError<T> {
    /// Queue at capacity; the offered item is handed back
    #[error("relay queue full")]
    Full(T),

    /// Queue closed; the offered item is handed back
    #[error("relay queue closed")]
    Closed(T),
}

impl<T> RelayError<T> {
    /// Recover the item that was not enqueued
    pub fn into_inner(self) -> T {
        match self {
            RelayError::Full(item) | RelayError::Closed(item) => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_status_is_authorization_denied() {
        let err: StreamError = tonic::Status::permission_denied("bad token").into();
        assert!(err.is_authorization_denied());
        assert_eq!(err.to_string(), "authorization denied: bad token");
    }

    #[test]
    fn test_deadline_status_maps_to_deadline_exceeded() {
        let err: StreamError = tonic::Status::deadline_exceeded("timeout").into();
        assert!(matches!(err, StreamError::DeadlineExceeded));
        assert!(!err.is_authorization_denied());
    }

    #[test]
    fn test_unavailable_status_is_transport_error() {
        let err: StreamError = tonic::Status::unavailable("connection refused").into();
        match err {
            StreamError::Transport(status) => {
                assert_eq!(status.code(), tonic::Code::Unavailable)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_auth_error_into_forwarder_error() {
        let err: ForwarderError = AuthError::Discovery("status 500".to_string()).into();
        assert!(matches!(err, ForwarderError::Auth(AuthError::Discovery(_))));
    }

    #[test]
    fn test_relay_error_returns_item() {
        let err = RelayError::Full(7u32);
        assert_eq!(err.into_inner(), 7);
    }
}
