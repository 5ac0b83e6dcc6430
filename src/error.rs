//! Typed errors surfaced by calls against a Banana endpoint.

use std::time::Duration;

/// What went wrong with a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or missing API key (HTTP 401)
    Auth,
    /// Endpoint or model does not exist (HTTP 404)
    NotFound,
    /// Request body rejected as too large (HTTP 413)
    PayloadTooLarge,
    /// HTTP 418
    Teapot,
    /// Caller is over quota (HTTP 400 with retry disabled)
    Quota,
    /// All servers are busy (HTTP 423 with retry disabled)
    ServerBusy,
    /// Unrecoverable error on Banana or the model server (HTTP 500)
    Internal,
    /// Temporary outage (HTTP 503 with retry disabled)
    Temporary,
    /// Gateway closed the call after its hard time limit (HTTP 504)
    Timeout,
    /// Any status code outside the known table
    Unexpected,
    /// Retry loop ran past its wall-clock budget
    DeadlineExceeded,
    /// A successful exchange was missing a required field
    MalformedResponse,
    /// The response message reported an error
    Remote,
    /// No status code was obtained (DNS, connect, TLS, body read)
    Transport,
    /// API key or model key could not be resolved from configuration
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "authentication failed",
            ErrorKind::NotFound => "not found",
            ErrorKind::PayloadTooLarge => "payload too large",
            ErrorKind::Teapot => "teapot",
            ErrorKind::Quota => "over quota",
            ErrorKind::ServerBusy => "server busy",
            ErrorKind::Internal => "internal server error",
            ErrorKind::Temporary => "temporarily unavailable",
            ErrorKind::Timeout => "gateway timeout",
            ErrorKind::Unexpected => "unexpected response",
            ErrorKind::DeadlineExceeded => "retry deadline exceeded",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::Remote => "remote error",
            ErrorKind::Transport => "transport error",
            ErrorKind::Config => "configuration error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the engine and the job orchestrator.
///
/// Carries the status code and raw body of the response that caused it, so a
/// failure can be diagnosed without re-running the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    kind: ErrorKind,
    status: Option<u16>,
    detail: String,
    body: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            detail: detail.into(),
            body: String::new(),
        }
    }

    /// Attach the response that produced this error.
    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.status = Some(status);
        self.body = body.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn deadline_exceeded(deadline: Duration, attempts: u32) -> Self {
        Self::new(
            ErrorKind::DeadlineExceeded,
            format!(
                "gave up after {} attempt(s); retry deadline of {:.1}s exceeded",
                attempts,
                deadline.as_secs_f64()
            ),
        )
    }

    pub fn transport(error: anyhow::Error) -> Self {
        Self::new(ErrorKind::Transport, format!("{:#}", error))
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, detail)
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// True for failures that retry mode would have waited out.
    pub fn is_retryable_hint(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Quota | ErrorKind::ServerBusy | ErrorKind::Temporary
        )
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        if !self.body.is_empty() {
            write!(f, "\n{}", self.body)?;
        }
        Ok(())
    }
}

impl std::error::Error for ClientError {}
