//! The isolated runtime: loads a user script through a [`host::ScriptHost`],
//! runs it, marshals its result, captures its figures and produces the single
//! protocol payload handed back to the orchestrator.

pub mod capture;
#[cfg(unix)]
pub mod channel;
pub mod error;
pub mod executor;
pub mod host;
pub mod marshal;
pub mod metrics;
pub mod value;
