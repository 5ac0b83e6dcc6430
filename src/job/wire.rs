//! JSON payloads of the start/check protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ClientError, ErrorKind};

/// Which generation of the start/check routes to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    V3,
    #[default]
    V4,
}

impl ApiVersion {
    pub fn start_route(&self) -> &'static str {
        match self {
            ApiVersion::V3 => "start/v3/",
            ApiVersion::V4 => "start/v4/",
        }
    }

    pub fn check_route(&self) -> &'static str {
        match self {
            ApiVersion::V3 => "check/v3/",
            ApiVersion::V4 => "check/v4/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload<'a> {
    pub id: &'a str,
    pub created: u64,
    pub api_key: &'a str,
    pub model_key: &'a str,
    pub model_inputs: &'a Value,
    pub start_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPayload<'a> {
    pub id: &'a str,
    pub created: u64,
    pub long_poll: bool,
    #[serde(rename = "callID")]
    pub call_id: &'a str,
    pub api_key: &'a str,
}

/// Response of both start and check routes.
///
/// `id`, `created` and `apiVersion` are echoed back but never read, so any
/// JSON type is accepted for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created: Option<Value>,
    #[serde(default)]
    pub api_version: Option<Value>,
    #[serde(default)]
    pub model_outputs: Option<Value>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default, rename = "callID")]
    pub call_id: Option<String>,
}

impl JobResponse {
    /// A body that is not a JSON object reads as `{}`.
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        if !value.is_object() {
            return Ok(Self::default());
        }
        let text = value.to_string();
        serde_json::from_value(value).map_err(|e| {
            ClientError::malformed(format!("unexpected response shape: {}", e)).with_body(text)
        })
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.unwrap_or(false)
    }

    /// `message` equals "success", ignoring case.
    pub fn is_success(&self) -> bool {
        self.message().eq_ignore_ascii_case("success")
    }

    /// `message` mentions an error, ignoring case.
    pub fn reports_error(&self) -> bool {
        self.message().to_lowercase().contains("error")
    }

    /// Fail with [`ErrorKind::Remote`] when the server reported an error.
    pub fn check_remote_error(self) -> Result<Self, ClientError> {
        if self.reports_error() {
            let body = serde_json::to_string(&self).unwrap_or_default();
            return Err(ClientError::new(ErrorKind::Remote, self.message()).with_body(body));
        }
        Ok(self)
    }

    pub fn outputs(&self) -> Value {
        self.model_outputs.clone().unwrap_or(Value::Null)
    }
}

/// Identifier of a job that did not finish synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self(call_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobHandle {
    fn from(call_id: String) -> Self {
        Self(call_id)
    }
}

impl From<&str> for JobHandle {
    fn from(call_id: &str) -> Self {
        Self(call_id.to_string())
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The job completed within the submission; carries `modelOutputs`.
    Finished(Value),
    Pending(JobHandle),
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    /// Carries `modelOutputs`.
    Complete(Value),
    Pending(JobResponse),
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Interpret a start response. `finished` takes precedence over `callID`.
pub fn interpret_start(value: Value) -> Result<StartOutcome, ClientError> {
    let response = JobResponse::from_value(value)?.check_remote_error()?;
    if response.is_finished() {
        return Ok(StartOutcome::Finished(response.outputs()));
    }
    match response.call_id {
        Some(call_id) if !call_id.is_empty() => Ok(StartOutcome::Pending(JobHandle(call_id))),
        _ => {
            let body = serde_json::to_string(&response).unwrap_or_default();
            Err(ClientError::malformed("start response is neither finished nor has a callID")
                .with_body(body))
        }
    }
}

pub fn interpret_check(value: Value) -> Result<CheckStatus, ClientError> {
    let response = JobResponse::from_value(value)?.check_remote_error()?;
    if response.is_success() {
        return Ok(CheckStatus::Complete(response.outputs()));
    }
    Ok(CheckStatus::Pending(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_payload_field_names() {
        let inputs = json!({"prompt": "hi"});
        let payload = StartPayload {
            id: "req",
            created: 1700000000,
            api_key: "key",
            model_key: "model",
            model_inputs: &inputs,
            start_only: true,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "id": "req",
                "created": 1700000000,
                "apiKey": "key",
                "modelKey": "model",
                "modelInputs": {"prompt": "hi"},
                "startOnly": true
            })
        );
    }

    #[test]
    fn test_check_payload_field_names() {
        let payload = CheckPayload {
            id: "req",
            created: 1,
            long_poll: true,
            call_id: "call-1",
            api_key: "key",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"id": "req", "created": 1, "longPoll": true, "callID": "call-1", "apiKey": "key"})
        );
    }

    #[test]
    fn test_routes_per_version() {
        assert_eq!(ApiVersion::default().start_route(), "start/v4/");
        assert_eq!(ApiVersion::V4.check_route(), "check/v4/");
        assert_eq!(ApiVersion::V3.start_route(), "start/v3/");
        assert_eq!(ApiVersion::V3.check_route(), "check/v3/");
    }

    #[test]
    fn test_interpret_start_finished() {
        let outcome =
            interpret_start(json!({"finished": true, "modelOutputs": [1, 2, 3]})).unwrap();
        assert_eq!(outcome, StartOutcome::Finished(json!([1, 2, 3])));
    }

    #[test]
    fn test_interpret_start_finished_wins_over_call_id() {
        let outcome = interpret_start(json!({
            "finished": true,
            "callID": "abc",
            "modelOutputs": [{"image": "..."}]
        }))
        .unwrap();
        assert_eq!(outcome, StartOutcome::Finished(json!([{"image": "..."}])));
    }

    #[test]
    fn test_interpret_start_pending() {
        let outcome = interpret_start(json!({"finished": false, "callID": "abc"})).unwrap();
        assert_eq!(outcome, StartOutcome::Pending(JobHandle::new("abc")));
    }

    #[test]
    fn test_interpret_start_without_call_id_is_malformed() {
        let err = interpret_start(json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_interpret_start_remote_error() {
        let err = interpret_start(json!({"message": "Error: model not deployed"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.detail().contains("model not deployed"));
    }

    #[test]
    fn test_interpret_check_success_is_case_insensitive() {
        let status = interpret_check(json!({"message": "SUCCESS", "modelOutputs": [9]})).unwrap();
        assert_eq!(status, CheckStatus::Complete(json!([9])));
    }

    #[test]
    fn test_interpret_check_pending_keeps_response() {
        let status = interpret_check(json!({"message": "queued", "callID": "abc"})).unwrap();
        match status {
            CheckStatus::Pending(response) => {
                assert_eq!(response.message(), "queued");
                assert_eq!(response.call_id.as_deref(), Some("abc"));
            }
            other => panic!("Expected pending, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let err = interpret_check(json!({"message": 42})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.body().contains("42"));
    }

    #[test]
    fn test_unread_fields_accept_any_type() {
        let status = interpret_check(json!({
            "id": 7,
            "created": "1700000000",
            "apiVersion": {"major": 4},
            "message": "success",
            "modelOutputs": [1]
        }))
        .unwrap();
        assert_eq!(status, CheckStatus::Complete(json!([1])));
    }

    #[test]
    fn test_non_object_body_reads_as_empty() {
        for body in [json!(null), json!([1, 2]), json!("queued"), json!(3)] {
            match interpret_check(body.clone()).unwrap() {
                CheckStatus::Pending(response) => assert_eq!(response, JobResponse::default()),
                other => panic!("Expected pending for {}, got {:?}", body, other),
            }
        }
        // same as an empty object on the start route
        let err = interpret_start(json!(null)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.detail().contains("callID"));
    }

    #[test]
    fn test_job_handle_serializes_as_plain_string() {
        let handle = JobHandle::from("call-9");
        assert_eq!(serde_json::to_value(&handle).unwrap(), json!("call-9"));
        assert_eq!(handle.to_string(), "call-9");
    }
}
