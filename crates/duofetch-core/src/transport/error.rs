//! Transport error type and curl error classification.

use std::fmt;

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection (DNS, refused, TLS handshake).
    ConnectFailed,
    /// The request did not finish within its timeout.
    Timeout,
    /// The peer answered with something unusable (bad status, broken range,
    /// truncated body, ...).
    ProtocolError,
    /// The caller asked for the request to stop.
    Canceled,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectFailed => "connect failed",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::ProtocolError => "protocol error",
            TransportErrorKind::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Error raised by a [`TransportChannel`](super::TransportChannel).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// HTTP status when the failure came from a response.
    pub status: Option<u32>,
    detail: String,
    source: Option<curl::Error>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            detail: detail.into(),
            source: None,
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, detail)
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ProtocolError, detail)
    }

    pub fn canceled() -> Self {
        Self::new(TransportErrorKind::Canceled, "request canceled")
    }

    /// Non-success HTTP status.
    pub fn http_status(code: u32) -> Self {
        Self {
            status: Some(code),
            ..Self::protocol(format!("HTTP {}", code))
        }
    }
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        Self {
            kind: classify_curl_error(&e),
            status: None,
            detail: e.to_string(),
            source: Some(e),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Classify a curl error into a transport error kind.
pub fn classify_curl_error(e: &curl::Error) -> TransportErrorKind {
    if e.is_operation_timedout() {
        return TransportErrorKind::Timeout;
    }
    if e.is_aborted_by_callback() {
        return TransportErrorKind::Canceled;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_ssl_connect_error()
        || e.is_peer_failed_verification()
    {
        return TransportErrorKind::ConnectFailed;
    }
    TransportErrorKind::ProtocolError
}
