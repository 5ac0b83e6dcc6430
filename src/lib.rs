pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod runtime;

pub use api::ProjectsApi;
pub use config::{BananaConfig, BananaModel, ConfigProvider};
pub use error::{ClientError, ErrorKind};
pub use http::{CallEngine, CallRequest, RetryPolicy};
pub use job::{ApiVersion, Banana, CheckStatus, JobHandle, StartOutcome};
