use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::BananaConfig;
use crate::http::{ReqwestTransport, RetryPolicy};
use crate::job::{Banana, CheckStatus, JobHandle, StartOutcome};
use crate::runtime::Runtime;

/// Options shared by `run`, `start` and `check`.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Explicit config file instead of `~/.banana/config.json`
    pub config_path: Option<PathBuf>,
    pub no_retry: bool,
    pub deadline: Option<Duration>,
}

impl CallOptions {
    fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default().with_retry(!self.no_retry);
        if let Some(deadline) = self.deadline {
            policy = policy.with_deadline(deadline);
        }
        policy
    }
}

fn client<R: Runtime>(runtime: &R, options: &CallOptions) -> Result<Banana<ReqwestTransport>> {
    let config = match &options.config_path {
        Some(path) => BananaConfig::load_from(runtime, path)?,
        None => BananaConfig::load(runtime)?,
    };
    Ok(Banana::from_config(config)?.with_policy(options.policy()))
}

fn parse_inputs(inputs: &str) -> Result<Value> {
    serde_json::from_str(inputs).context("Model inputs must be valid JSON")
}

/// Run a model to completion and return its outputs.
#[tracing::instrument(skip(runtime, inputs))]
pub async fn run<R: Runtime>(
    runtime: &R,
    options: &CallOptions,
    inputs: &str,
    model: Option<&str>,
) -> Result<Value> {
    let inputs = parse_inputs(inputs)?;
    let banana = client(runtime, options)?;
    Ok(banana.run(&inputs, model).await?)
}

/// Submit a job and return its call id (or its outputs if it finished).
#[tracing::instrument(skip(runtime, inputs))]
pub async fn start<R: Runtime>(
    runtime: &R,
    options: &CallOptions,
    inputs: &str,
    model: Option<&str>,
) -> Result<Value> {
    let inputs = parse_inputs(inputs)?;
    let banana = client(runtime, options)?;
    Ok(match banana.start(&inputs, model).await? {
        StartOutcome::Finished(outputs) => json!({"finished": true, "modelOutputs": outputs}),
        StartOutcome::Pending(handle) => json!({"finished": false, "callID": handle}),
    })
}

/// Check a submitted job once.
#[tracing::instrument(skip(runtime))]
pub async fn check<R: Runtime>(runtime: &R, options: &CallOptions, call_id: &str) -> Result<Value> {
    let banana = client(runtime, options)?;
    Ok(match banana.check(&JobHandle::from(call_id)).await? {
        CheckStatus::Complete(outputs) => json!({"finished": true, "modelOutputs": outputs}),
        CheckStatus::Pending(response) => json!({
            "finished": false,
            "callID": call_id,
            "message": response.message(),
        }),
    })
}
