//! Stagehand core library — project configuration, console formatting, errors.
//!
//! - [`types`] — newtypes and config structs
//! - [`config`] — discover / load / validate / scaffold `stagehand.yaml`
//! - [`console`] — stateless, capability-driven message formatting
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod console;
pub mod error;
pub mod types;

pub use console::{Console, Severity};
pub use error::ConfigError;
pub use types::{ProjectConfig, RuntimeConfig, ServiceConfig, ServiceName, DEFAULT_EXCLUDES};
