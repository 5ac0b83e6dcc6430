//! Retry/backoff engine: drives transport calls until a response is
//! classified as success or fatal, or the call's deadline runs out.

use log::error;
use serde_json::Value;

use super::backoff::{CallAttempt, RetryLoop, RetryPolicy, Step};
use super::request::{API_KEY_HEADER, CallRequest, REQUEST_ID_HEADER, endpoint};
use super::transport::{BlockingTransport, HttpRequest, Transport};
use crate::error::ClientError;

/// Sends [`CallRequest`]s to one Banana base URL with retry and backoff.
///
/// `execute` is available over an async [`Transport`] and sleeps with
/// `tokio::time::sleep`; `execute_blocking` is available over a
/// [`BlockingTransport`] and blocks the calling thread. Both run the same
/// [`RetryLoop`].
#[derive(Clone)]
pub struct CallEngine<T> {
    transport: T,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl<T> CallEngine<T> {
    pub fn new(transport: T, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            api_key: api_key.into().trim().to_string(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Wire form of a call. Every attempt carries the same request id.
    pub fn http_request(&self, request: &CallRequest) -> HttpRequest {
        let mut http = HttpRequest::post(
            endpoint(&self.base_url, request.route()),
            request.payload().clone(),
        );
        http.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        http.headers
            .push((API_KEY_HEADER.to_string(), self.api_key.clone()));
        http.headers.push((
            REQUEST_ID_HEADER.to_string(),
            request.request_id().to_string(),
        ));
        http.headers.extend(request.headers().iter().cloned());
        http
    }

    fn retry_loop(&self, request: &CallRequest) -> RetryLoop {
        RetryLoop::new(
            request.route(),
            &self.policy,
            request.retry_override(),
            request.deadline_override(),
        )
    }
}

fn transport_failure(route: &str, err: anyhow::Error) -> ClientError {
    let err = ClientError::transport(err);
    error!("{}: {}", route, err);
    err
}

impl<T: Transport> CallEngine<T> {
    #[tracing::instrument(skip(self, request), fields(route = request.route(), request_id = request.request_id()))]
    pub async fn execute(&self, request: &CallRequest) -> Result<Value, ClientError> {
        let http = self.http_request(request);
        let mut state = self.retry_loop(request);
        let start = tokio::time::Instant::now();

        loop {
            let index = state.begin_attempt(start.elapsed())?;
            let response = self
                .transport
                .send(&http)
                .await
                .map_err(|e| transport_failure(request.route(), e))?;

            let attempt = CallAttempt {
                index,
                elapsed: start.elapsed(),
                status: response.status,
                body: response.body,
            };
            match state.on_response(attempt) {
                Step::Done(value) => return Ok(value),
                Step::Wait(delay) => tokio::time::sleep(delay).await,
                Step::Fail(err) => return Err(err),
            }
        }
    }
}

impl<T: BlockingTransport> CallEngine<T> {
    #[tracing::instrument(skip(self, request), fields(route = request.route(), request_id = request.request_id()))]
    pub fn execute_blocking(&self, request: &CallRequest) -> Result<Value, ClientError> {
        let http = self.http_request(request);
        let mut state = self.retry_loop(request);
        let start = std::time::Instant::now();

        loop {
            let index = state.begin_attempt(start.elapsed())?;
            let response = self
                .transport
                .send(&http)
                .map_err(|e| transport_failure(request.route(), e))?;

            let attempt = CallAttempt {
                index,
                elapsed: start.elapsed(),
                status: response.status,
                body: response.body,
            };
            match state.on_response(attempt) {
                Step::Done(value) => return Ok(value),
                Step::Wait(delay) => std::thread::sleep(delay),
                Step::Fail(err) => return Err(err),
            }
        }
    }
}
