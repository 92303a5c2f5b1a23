//! Convenient re-exports for common kfdeploy types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    client::{DeploymentClient, DeploymentClientBuilder},
    config::ClientConfig,
    context::CallContext,
    document::DeploymentDocument,
    error::{CallError, ConfigError, DeployError, RetryError},
    jitter::Jitter,
    rate_limit::{RateLimitLayer, TokenBucket},
    request::DeploymentRequest,
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    telemetry::{DeployEvent, TelemetrySink},
};
