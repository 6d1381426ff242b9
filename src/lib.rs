pub mod config;
pub mod core;
pub mod native;
#[cfg(feature = "python")]
pub mod python;
pub mod runtime;
pub mod service;
