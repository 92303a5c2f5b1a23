//! Telemetry for deployment calls.
//!
//! The client reports terminal outcomes and completions as [`DeployEvent`]s. Sinks are
//! `tower::Service<DeployEvent>` implementations injected into the client, so metrics exporters
//! live outside the core crate and tests can capture events with [`MemorySink`].

pub mod events;
pub mod sinks;

pub use events::{DeployEvent, OutcomeCause};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
