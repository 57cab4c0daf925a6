//! Field telemetry agent with at-least-once delivery.
//!
//! The agent reads sensor sources and a device status probe on a fixed
//! cadence and posts each batch to an HTTP collector. A batch the collector
//! does not confirm with 201 goes into a durable on-disk queue, and a
//! background worker keeps re-sending queued batches until they are confirmed
//! or rejected as invalid (422).
//!
//! # Collector API
//!
//! ```text
//! POST /devices          {id, description}      -> {token}
//! POST /metrics          [MetricRecord, ...]    -> 201
//! POST /devices/status   DeviceStatus           -> 201
//! ```
//!
//! Every request carries the device token in `X-API-KEY`. A 401 triggers one
//! re-registration and a single resend.
//!
//! # Modules
//!
//! - [`identity`] - device identity and token bootstrap
//! - [`exporter`] - live delivery
//! - [`queue`] - durable queue of undelivered batches
//! - [`retry`] - background queue sweep
//! - [`orchestrator`] - collection cadence
//! - [`agent`] - component wiring

pub mod agent;
pub mod config;
pub mod device_status;
pub mod exporter;
pub mod identity;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod sources;

pub use agent::Agent;
pub use config::FieldlinkConfig;
