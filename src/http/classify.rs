//! Status code classification for Banana responses.
//!
//! Decides per status code whether a response is a success, worth another
//! attempt, or fatal. 400, 423 and 503 signal transient capacity problems and
//! are only retried when retry mode is on; everything else is either success
//! or fatal regardless of mode.

use crate::error::{ClientError, ErrorKind};

/// Appended to 423 errors raised with retry disabled.
pub const SERVER_BUSY_GUIDANCE: &str = "423 errors are returned when all of your servers are busy handling requests.\n\
In most cases you just want to retry later. Calling with retry enabled handles this for you.";

/// Appended to 504 errors, which are never retried.
pub const GATEWAY_TIMEOUT_GUIDANCE: &str = "The gateway closed the call after its hard time limit, so retrying will not help.\n\
For long-running jobs, submit with start() and poll with check() instead.";

/// Why a response deserves another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// HTTP 400: caller is at their quota
    Quota,
    /// HTTP 423: every server is busy
    ServerBusy,
    /// HTTP 503: temporary outage
    Temporary,
}

impl RetryReason {
    /// The error kind this reason becomes when retry is disabled.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetryReason::Quota => ErrorKind::Quota,
            RetryReason::ServerBusy => ErrorKind::ServerBusy,
            RetryReason::Temporary => ErrorKind::Temporary,
        }
    }
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retry(RetryReason),
    Fatal(ErrorKind, String),
}

impl Outcome {
    /// Turn a non-success outcome into the error a caller sees.
    pub fn into_error(self, status: u16, body: &str) -> Option<ClientError> {
        match self {
            Outcome::Success => None,
            Outcome::Retry(reason) => Some(
                ClientError::new(reason.kind(), format!("status code {}", status))
                    .with_response(status, body),
            ),
            Outcome::Fatal(kind, detail) => {
                Some(ClientError::new(kind, detail).with_response(status, body))
            }
        }
    }
}

/// Classifies a status code. Pure and total: unknown codes are fatal.
pub fn classify(status: u16, retry_enabled: bool) -> Outcome {
    match status {
        200 => Outcome::Success,
        400 if retry_enabled => Outcome::Retry(RetryReason::Quota),
        400 => Outcome::Fatal(
            ErrorKind::Quota,
            "your account is at its request quota".to_string(),
        ),
        401 => Outcome::Fatal(
            ErrorKind::Auth,
            "invalid or missing API key".to_string(),
        ),
        404 => Outcome::Fatal(
            ErrorKind::NotFound,
            "the requested endpoint does not exist".to_string(),
        ),
        413 => Outcome::Fatal(
            ErrorKind::PayloadTooLarge,
            "request payload is too large".to_string(),
        ),
        418 => Outcome::Fatal(ErrorKind::Teapot, "banana is a teapot".to_string()),
        423 if retry_enabled => Outcome::Retry(RetryReason::ServerBusy),
        423 => Outcome::Fatal(ErrorKind::ServerBusy, SERVER_BUSY_GUIDANCE.to_string()),
        500 => Outcome::Fatal(
            ErrorKind::Internal,
            "the server had an unrecoverable error".to_string(),
        ),
        503 if retry_enabled => Outcome::Retry(RetryReason::Temporary),
        503 => Outcome::Fatal(
            ErrorKind::Temporary,
            "the service is temporarily unavailable".to_string(),
        ),
        504 => Outcome::Fatal(ErrorKind::Timeout, GATEWAY_TIMEOUT_GUIDANCE.to_string()),
        other => Outcome::Fatal(
            ErrorKind::Unexpected,
            format!("unexpected status code {}", other),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fatal_kind(outcome: Outcome) -> ErrorKind {
        match outcome {
            Outcome::Fatal(kind, _) => kind,
            other => panic!("Expected fatal outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_table_retry_enabled() {
        assert_eq!(classify(200, true), Outcome::Success);
        assert_eq!(classify(400, true), Outcome::Retry(RetryReason::Quota));
        assert_eq!(fatal_kind(classify(401, true)), ErrorKind::Auth);
        assert_eq!(fatal_kind(classify(404, true)), ErrorKind::NotFound);
        assert_eq!(fatal_kind(classify(413, true)), ErrorKind::PayloadTooLarge);
        assert_eq!(fatal_kind(classify(418, true)), ErrorKind::Teapot);
        assert_eq!(classify(423, true), Outcome::Retry(RetryReason::ServerBusy));
        assert_eq!(fatal_kind(classify(500, true)), ErrorKind::Internal);
        assert_eq!(classify(503, true), Outcome::Retry(RetryReason::Temporary));
        assert_eq!(fatal_kind(classify(504, true)), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_table_retry_disabled() {
        assert_eq!(classify(200, false), Outcome::Success);
        assert_eq!(fatal_kind(classify(400, false)), ErrorKind::Quota);
        assert_eq!(fatal_kind(classify(401, false)), ErrorKind::Auth);
        assert_eq!(fatal_kind(classify(404, false)), ErrorKind::NotFound);
        assert_eq!(fatal_kind(classify(413, false)), ErrorKind::PayloadTooLarge);
        assert_eq!(fatal_kind(classify(418, false)), ErrorKind::Teapot);
        assert_eq!(fatal_kind(classify(423, false)), ErrorKind::ServerBusy);
        assert_eq!(fatal_kind(classify(500, false)), ErrorKind::Internal);
        assert_eq!(fatal_kind(classify(503, false)), ErrorKind::Temporary);
        assert_eq!(fatal_kind(classify(504, false)), ErrorKind::Timeout);
    }

    #[test]
    fn test_classify_unmapped_codes_are_unexpected() {
        for status in [201, 204, 301, 403, 429, 502] {
            for retry in [true, false] {
                assert_eq!(
                    classify(status, retry),
                    Outcome::Fatal(
                        ErrorKind::Unexpected,
                        format!("unexpected status code {}", status)
                    )
                );
            }
        }
    }

    #[test]
    fn test_server_busy_without_retry_suggests_retry_mode() {
        match classify(423, false) {
            Outcome::Fatal(ErrorKind::ServerBusy, detail) => {
                assert!(detail.contains("retry enabled"));
            }
            other => panic!("Expected ServerBusy, got {:?}", other),
        }
    }

    #[test]
    fn test_gateway_timeout_suggests_background_jobs() {
        match classify(504, true) {
            Outcome::Fatal(ErrorKind::Timeout, detail) => {
                assert!(detail.contains("start()"));
                assert!(detail.contains("check()"));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_into_error_carries_status_and_body() {
        let err = classify(401, true).into_error(401, "bad key").unwrap();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), "bad key");

        let err = classify(503, true).into_error(503, "down").unwrap();
        assert_eq!(err.kind(), ErrorKind::Temporary);

        assert!(classify(200, true).into_error(200, "{}").is_none());
    }
}
