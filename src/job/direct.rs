//! Calls routed straight to a self-hosted model server.
//!
//! The server takes the raw model inputs and answers with the raw outputs;
//! the reply is wrapped into the hosted response shape so callers see the
//! same `modelOutputs` either way.

use serde_json::Value;

use super::wire::{JobResponse, unix_now};
use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse, classify, new_request_id};

pub const DIRECT_API_VERSION: &str = "DIRECT";

pub fn direct_request(server: &str, inputs: &Value) -> HttpRequest {
    let mut request = HttpRequest::post(server, inputs.clone());
    request
        .headers
        .push(("Content-Type".to_string(), "application/json".to_string()));
    request
}

/// Wrap a direct server reply as a finished hosted response.
pub fn direct_response(reply: Value) -> JobResponse {
    JobResponse {
        id: Some(Value::String(new_request_id())),
        message: Some(String::new()),
        created: Some(Value::String(unix_now().to_string())),
        api_version: Some(Value::String(DIRECT_API_VERSION.to_string())),
        model_outputs: Some(Value::Array(vec![reply])),
        finished: Some(true),
        call_id: None,
    }
}

/// No retries here: any non-200 is fatal, and the body must be JSON.
pub fn direct_outputs(response: HttpResponse) -> Result<Value, ClientError> {
    if let Some(err) = classify(response.status, false).into_error(response.status, &response.body)
    {
        return Err(err);
    }
    let reply: Value = serde_json::from_str(&response.body).map_err(|_| {
        ClientError::malformed("direct server returned invalid JSON")
            .with_response(response.status, response.body.clone())
    })?;
    Ok(direct_response(reply).outputs())
}
