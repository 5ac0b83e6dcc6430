//! Immutable description of one logical call.

use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "X-BANANA-API-KEY";
pub const MODEL_KEY_HEADER: &str = "X-BANANA-MODEL-KEY";
pub const REQUEST_ID_HEADER: &str = "X-BANANA-REQUEST-ID";

/// Fresh identifier for a logical call.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Joins a base URL and a route with exactly one slash between them.
pub fn endpoint(base_url: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

/// A request the engine may send any number of times.
///
/// The request id is fixed at construction so every retry of the call is
/// traceable as the same call on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    route: String,
    payload: Value,
    headers: Vec<(String, String)>,
    request_id: String,
    allow_retry: Option<bool>,
    deadline: Option<Duration>,
}

impl CallRequest {
    pub fn new(route: impl Into<String>, payload: Value) -> Self {
        Self {
            route: route.into(),
            payload,
            headers: Vec::new(),
            request_id: new_request_id(),
            allow_retry: None,
            deadline: None,
        }
    }

    /// Reuse the id of an enclosing logical call.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_model_key(self, model_key: impl Into<String>) -> Self {
        self.with_header(MODEL_KEY_HEADER, model_key)
    }

    /// Override the engine's retry mode for this call only.
    pub fn allow_retry(mut self, retry: bool) -> Self {
        self.allow_retry = Some(retry);
        self
    }

    /// Override the engine's deadline for this call only.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn retry_override(&self) -> Option<bool> {
        self.allow_retry
    }

    pub fn deadline_override(&self) -> Option<Duration> {
        self.deadline
    }
}
