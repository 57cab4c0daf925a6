//! fieldlink Agent Framework
//!
//! Common abstractions for building long-running field agents.
//!
//! # Overview
//!
//! This framework provides:
//! - [`AgentConfig`] trait for configuration loading, environment overrides and validation
//! - [`AgentRunner`] for managing agent lifecycle (startup, shutdown, signal handling)
//! - [`Shutdown`] for cooperative, bounded-latency shutdown of loops and sleeps
//! - [`AgentArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use fieldlink_agent_framework::{AgentArgs, AgentConfig, AgentRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = AgentArgs::parse_with_default("myagent.json5");
//!     let config = MyAgentConfig::load(&args.config)?;
//!
//!     let mut runner = AgentRunner::new_with_args("myagent", config, Some(&args))?;
//!
//!     // Spawn workers that observe the shutdown token
//!     runner.spawn("worker", my_worker(runner.shutdown()));
//!
//!     // Run until SIGINT/SIGTERM
//!     runner.run().await
//! }
//! ```

mod args;
mod config;
mod error;
mod runner;
pub mod shutdown;

pub use args::AgentArgs;
pub use config::{AgentConfig, env_override};
pub use error::{AgentError, Result};
pub use runner::{AgentRunner, DEFAULT_GRACE_PERIOD, wait_for_signal};
pub use shutdown::{Shutdown, ShutdownTrigger};

// Re-export commonly used types from fieldlink-common
pub use fieldlink_common::{
    Batch, DeviceStatus, LogFormat, LoggingConfig, MetricKind, MetricRecord,
};
