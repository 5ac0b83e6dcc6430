//! HTTP layer: transport, status classification, backoff and the retry
//! engine built on top of them.

mod backoff;
mod classify;
mod client;
mod request;
mod transport;

pub use backoff::{
    Backoff, CallAttempt, DEFAULT_DEADLINE, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL,
    DEFAULT_MULTIPLIER, RetryLoop, RetryPolicy, Step, parse_body,
};
pub use classify::{
    GATEWAY_TIMEOUT_GUIDANCE, Outcome, RetryReason, SERVER_BUSY_GUIDANCE, classify,
};
pub use client::CallEngine;
pub use request::{
    API_KEY_HEADER, CallRequest, MODEL_KEY_HEADER, REQUEST_ID_HEADER, endpoint, new_request_id,
};
pub use transport::{
    BlockingReqwestTransport, BlockingTransport, HttpRequest, HttpResponse, Method,
    ReqwestTransport, Transport, USER_AGENT,
};

#[cfg(test)]
pub use transport::{MockBlockingTransport, MockTransport};
