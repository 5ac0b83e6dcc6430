//! Job orchestration over the start/check protocol.
//!
//! A submission either finishes within the first round trip or returns a
//! `callID`. [`Banana::run`] turns the second case into a synchronous-looking
//! call by polling the check route until the job reports success. One request
//! id is shared by the submission and every poll of the same call.
//!
//! State machine: `Submitted -> (Finished | Pending) -> [Polling]* -> Completed`.
//! Any fatal error from the engine ends the call; the orchestrator adds no
//! retry layer of its own. The policy deadline bounds the whole `run`: each
//! poll only gets what is left of it.

mod direct;
mod wire;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ConfigProvider;
use crate::error::{ClientError, ErrorKind};
use crate::http::{
    BlockingReqwestTransport, BlockingTransport, CallEngine, CallRequest, ReqwestTransport,
    RetryPolicy, Transport, new_request_id,
};

pub use direct::{DIRECT_API_VERSION, direct_outputs, direct_request, direct_response};
pub use wire::{
    ApiVersion, CheckPayload, CheckStatus, JobHandle, JobResponse, StartOutcome, StartPayload,
    interpret_check, interpret_start, unix_now,
};

/// Client for one Banana account.
///
/// Holds no per-call state; concurrent calls on a shared client each get
/// their own request id and backoff.
pub struct Banana<T> {
    engine: CallEngine<T>,
    config: Arc<dyn ConfigProvider>,
    version: ApiVersion,
}

impl<T> Banana<T> {
    pub fn new(transport: T, config: impl ConfigProvider + 'static) -> Result<Self, ClientError> {
        let api_key = match config.api_key() {
            Some(key) => key,
            // a self-hosted server needs no credentials
            None if config.direct_server().is_some() => String::new(),
            None => {
                return Err(ClientError::config(
                    "no API key configured; set BANANA_APIKEY or add one to ~/.banana/config.json",
                ));
            }
        };
        let engine = CallEngine::new(transport, config.base_url(), api_key);
        Ok(Self {
            engine,
            config: Arc::new(config),
            version: ApiVersion::default(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.engine = self.engine.with_policy(policy);
        self
    }

    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    pub fn engine(&self) -> &CallEngine<T> {
        &self.engine
    }

    pub fn api_version(&self) -> ApiVersion {
        self.version
    }

    fn model_key(&self, model: Option<&str>) -> Result<String, ClientError> {
        self.config.resolve_model_key(model).ok_or_else(|| {
            ClientError::config(match model {
                Some(name) => format!("no model key registered for model '{}'", name),
                None => "no model selected; set BANANA_MODEL_KEY or register a model".to_string(),
            })
        })
    }

    fn start_request(
        &self,
        request_id: &str,
        inputs: &Value,
        model_key: &str,
        start_only: bool,
    ) -> Result<CallRequest, ClientError> {
        let payload = StartPayload {
            id: request_id,
            created: unix_now(),
            api_key: self.engine.api_key(),
            model_key,
            model_inputs: inputs,
            start_only,
        };
        Ok(
            CallRequest::new(self.version.start_route(), encode(&payload)?)
                .with_request_id(request_id)
                .with_model_key(model_key),
        )
    }

    fn check_request(
        &self,
        request_id: &str,
        handle: &JobHandle,
    ) -> Result<CallRequest, ClientError> {
        let payload = CheckPayload {
            id: request_id,
            created: unix_now(),
            long_poll: true,
            call_id: handle.as_str(),
            api_key: self.engine.api_key(),
        };
        Ok(CallRequest::new(self.version.check_route(), encode(&payload)?).with_request_id(request_id))
    }

    /// What is left of the call's deadline after `elapsed`, counting the
    /// submission and every poll.
    fn remaining_budget(&self, elapsed: Duration, requests: u32) -> Result<Duration, ClientError> {
        let deadline = self.engine.policy().deadline;
        match deadline.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => Ok(remaining),
            _ => {
                warn!(
                    "Polling stopped: deadline of {:.1}s exceeded after {} request(s)",
                    deadline.as_secs_f64(),
                    requests
                );
                Err(ClientError::deadline_exceeded(deadline, requests))
            }
        }
    }
}

fn encode<S: Serialize>(payload: &S) -> Result<Value, ClientError> {
    serde_json::to_value(payload).map_err(|e| {
        ClientError::new(ErrorKind::Unexpected, format!("failed to encode request: {}", e))
    })
}

impl Banana<ReqwestTransport> {
    /// Async client over a default `reqwest` connection pool.
    pub fn from_config(config: impl ConfigProvider + 'static) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::with_defaults()?;
        Ok(Self::new(transport, config)?)
    }
}

impl Banana<BlockingReqwestTransport> {
    /// Blocking client. Do not call from inside an async runtime.
    pub fn blocking_from_config(config: impl ConfigProvider + 'static) -> anyhow::Result<Self> {
        let transport = BlockingReqwestTransport::with_defaults()?;
        Ok(Self::new(transport, config)?)
    }
}

impl<T: Transport> Banana<T> {
    /// Run a model to completion and return its `modelOutputs`.
    #[tracing::instrument(skip(self, inputs))]
    pub async fn run(&self, inputs: &Value, model: Option<&str>) -> Result<Value, ClientError> {
        let started = Instant::now();
        let outputs = match self.config.direct_server() {
            Some(server) => self.run_direct(&server, inputs).await?,
            None => {
                let model_key = self.model_key(model)?;
                self.run_to_completion(inputs, &model_key).await?
            }
        };
        info!("Completed run in {:.2} secs", started.elapsed().as_secs_f64());
        Ok(outputs)
    }

    #[tracing::instrument(skip(self, inputs, model_key))]
    pub async fn run_to_completion(
        &self,
        inputs: &Value,
        model_key: &str,
    ) -> Result<Value, ClientError> {
        let started = tokio::time::Instant::now();
        let request_id = new_request_id();
        let request = self.start_request(&request_id, inputs, model_key, false)?;

        let handle = match interpret_start(self.engine.execute(&request).await?)? {
            StartOutcome::Finished(outputs) => return Ok(outputs),
            StartOutcome::Pending(handle) => handle,
        };
        debug!("Job {} pending, polling for completion...", handle);

        let mut requests = 1;
        loop {
            let remaining = self.remaining_budget(started.elapsed(), requests)?;
            let request = self
                .check_request(&request_id, &handle)?
                .with_deadline(remaining);
            requests += 1;
            match interpret_check(self.engine.execute(&request).await?)? {
                CheckStatus::Complete(outputs) => return Ok(outputs),
                CheckStatus::Pending(response) => {
                    debug!("Job {} still pending: {}", handle, response.message());
                }
            }
        }
    }

    /// Submit without waiting.
    ///
    /// Returns [`StartOutcome::Finished`] when the server completed the job
    /// within the submission anyway.
    #[tracing::instrument(skip(self, inputs))]
    pub async fn start(
        &self,
        inputs: &Value,
        model: Option<&str>,
    ) -> Result<StartOutcome, ClientError> {
        let model_key = self.model_key(model)?;
        let request = self.start_request(&new_request_id(), inputs, &model_key, true)?;
        interpret_start(self.engine.execute(&request).await?)
    }

    /// One long-poll check of a submitted job.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, handle: &JobHandle) -> Result<CheckStatus, ClientError> {
        let request = self.check_request(&new_request_id(), handle)?;
        interpret_check(self.engine.execute(&request).await?)
    }

    async fn run_direct(&self, server: &str, inputs: &Value) -> Result<Value, ClientError> {
        let request = direct_request(server, inputs);
        let response = self
            .engine
            .transport()
            .send(&request)
            .await
            .map_err(ClientError::transport)?;
        direct_outputs(response)
    }
}

impl<T: BlockingTransport> Banana<T> {
    /// Blocking [`Banana::run`].
    #[tracing::instrument(skip(self, inputs))]
    pub fn run_blocking(&self, inputs: &Value, model: Option<&str>) -> Result<Value, ClientError> {
        let started = Instant::now();
        let outputs = match self.config.direct_server() {
            Some(server) => self.run_direct_blocking(&server, inputs)?,
            None => {
                let model_key = self.model_key(model)?;
                self.run_to_completion_blocking(inputs, &model_key)?
            }
        };
        info!("Completed run in {:.2} secs", started.elapsed().as_secs_f64());
        Ok(outputs)
    }

    #[tracing::instrument(skip(self, inputs, model_key))]
    pub fn run_to_completion_blocking(
        &self,
        inputs: &Value,
        model_key: &str,
    ) -> Result<Value, ClientError> {
        let started = Instant::now();
        let request_id = new_request_id();
        let request = self.start_request(&request_id, inputs, model_key, false)?;

        let handle = match interpret_start(self.engine.execute_blocking(&request)?)? {
            StartOutcome::Finished(outputs) => return Ok(outputs),
            StartOutcome::Pending(handle) => handle,
        };
        debug!("Job {} pending, polling for completion...", handle);

        let mut requests = 1;
        loop {
            let remaining = self.remaining_budget(started.elapsed(), requests)?;
            let request = self
                .check_request(&request_id, &handle)?
                .with_deadline(remaining);
            requests += 1;
            match interpret_check(self.engine.execute_blocking(&request)?)? {
                CheckStatus::Complete(outputs) => return Ok(outputs),
                CheckStatus::Pending(response) => {
                    debug!("Job {} still pending: {}", handle, response.message());
                }
            }
        }
    }

    #[tracing::instrument(skip(self, inputs))]
    pub fn start_blocking(
        &self,
        inputs: &Value,
        model: Option<&str>,
    ) -> Result<StartOutcome, ClientError> {
        let model_key = self.model_key(model)?;
        let request = self.start_request(&new_request_id(), inputs, &model_key, true)?;
        interpret_start(self.engine.execute_blocking(&request)?)
    }

    #[tracing::instrument(skip(self))]
    pub fn check_blocking(&self, handle: &JobHandle) -> Result<CheckStatus, ClientError> {
        let request = self.check_request(&new_request_id(), handle)?;
        interpret_check(self.engine.execute_blocking(&request)?)
    }

    fn run_direct_blocking(&self, server: &str, inputs: &Value) -> Result<Value, ClientError> {
        let request = direct_request(server, inputs);
        let response = self
            .engine
            .transport()
            .send(&request)
            .map_err(ClientError::transport)?;
        direct_outputs(response)
    }
}
