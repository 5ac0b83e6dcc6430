//! Command implementations behind the `banana` binary.
//!
//! Each command returns the JSON it wants printed; `main` does the printing.

mod call;
pub mod config;

pub use call::{CallOptions, check, run, start};
pub use config::{ConfigAction, config};
