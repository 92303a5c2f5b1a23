#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # kfdeploy
//!
//! Resilient client for a remote deployment control plane: submit a deployment, then poll it
//! until it is healthy, degraded or out of time.
//!
//! ## Features
//!
//! - **Unary endpoints** (`create`, `getLatest`) as `tower::Service`s over JSON/HTTP
//! - **Shared token-bucket rate limiting** that fails fast instead of queuing
//! - **Deadline-bounded exponential backoff** driven by the caller's context
//! - **Deployment orchestration** with a preparing, creating and status-polling state machine
//! - **Typed response classification** into values, remote errors or diagnostic dumps
//! - **Pluggable telemetry sinks** for outcome and completion events
//!
//! ## Quick Start
//!
//! ```rust
//! use kfdeploy::{CallContext, DeploymentClient, DeploymentDocument, CallError, Condition};
//! use kfdeploy::{InstantSleeper, MemorySink, RetryPolicy, DeployError};
//! use tower::service_fn;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let create = service_fn(|doc: DeploymentDocument| async move { Ok::<_, CallError>(doc) });
//! let get = service_fn(|mut doc: DeploymentDocument| async move {
//!     doc.status.conditions.push(Condition::new("Available", "ready"));
//!     Ok::<_, CallError>(doc)
//! });
//! let policy = RetryPolicy::builder()
//!     .should_retry(DeployError::is_retryable)
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let client = DeploymentClient::builder()
//!     .endpoints(create, get)
//!     .retry_policy(policy)
//!     .sink(MemorySink::new())
//!     .build()
//!     .unwrap();
//!
//! let created = client
//!     .submit(&CallContext::new(), DeploymentDocument::new("v1", "KfDef"))
//!     .await
//!     .unwrap();
//! let ready = client.await_status(&CallContext::new(), created).await.unwrap();
//! assert_eq!(ready.status.conditions.len(), 1);
//! # });
//! ```

pub mod backoff;
pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod jitter;
pub mod phase;
pub mod prelude;
pub mod prepare;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use classify::classify;
pub use client::{check_conditions, DeploymentClient, DeploymentClientBuilder};
pub use config::ClientConfig;
pub use context::CallContext;
pub use document::{Condition, DeploymentDocument, DocumentError, Secret};
pub use error::{CallError, ConfigError, DeployError, RemoteError, RetryError};
pub use jitter::Jitter;
pub use phase::DeployPhase;
pub use prepare::{ConfigSource, DefaultConfigSource, StaticConfigSource};
pub use rate_limit::{Decision, RateLimitLayer, RateLimiter, TokenBucket};
pub use request::{AuthMode, DeploymentRequest, SecretString};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use telemetry::{DeployEvent, LogSink, MemorySink, NullSink, OutcomeCause, TelemetrySink};
#[cfg(feature = "http")]
pub use transport::HttpEndpoint;
pub use transport::DocumentEndpoint;
