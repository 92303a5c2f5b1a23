//! Error types for the deployment client.
//!
//! Three layers:
//! - [`CallError`]: the outcome of one endpoint round trip that did not produce a typed value.
//! - [`RetryError`]: how a retry loop ended when it did not succeed.
//! - [`DeployError`]: what a caller of the orchestrator sees.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Structured error returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    /// HTTP-style status code reported by the service.
    pub code: u16,
    /// Human readable description.
    pub message: String,
}

/// Failure of a single endpoint round trip.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// Network, I/O or decoding failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The shared rate limiter had no token available.
    #[error("rate limited; next token in {wait:?}")]
    RateLimited { wait: Duration },
    /// The service answered with a well-formed error.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The response matched neither the expected type nor the remote error shape.
    #[error("received unexpected response (status {status}); {dump}")]
    UnexpectedResponse { status: u16, dump: String },
}

impl CallError {
    /// Build a transport error from anything displayable.
    pub fn transport(err: impl fmt::Display) -> Self {
        CallError::Transport(err.to_string())
    }

    /// Transport and rate-limit failures are transient; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport(_) | CallError::RateLimited { .. })
    }

    /// Borrow the remote error if this is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            CallError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        CallError::Transport(err.to_string())
    }
}

/// How a retry loop gave up.
#[derive(Debug, Clone)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate classified as permanent.
    Permanent(E),
    /// The elapsed-time budget ran out. Wraps the last observed failure, if any.
    DeadlineExceeded { attempts: usize, elapsed: Duration, budget: Duration, last: Option<E> },
    /// The caller's context was cancelled.
    Cancelled { attempts: usize, last: Option<E> },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent(e) => write!(f, "{}", e),
            Self::DeadlineExceeded { attempts, elapsed, budget, last } => {
                write!(
                    f,
                    "deadline exceeded after {} attempts in {:?} (budget {:?})",
                    attempts, elapsed, budget
                )?;
                match last {
                    Some(e) => write!(f, "; last error: {}", e),
                    None => Ok(()),
                }
            }
            Self::Cancelled { attempts, last } => {
                write!(f, "cancelled after {} attempts", attempts)?;
                match last {
                    Some(e) => write!(f, "; last error: {}", e),
                    None => Ok(()),
                }
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Permanent(e) => Some(e),
            Self::DeadlineExceeded { last, .. } | Self::Cancelled { last, .. } => {
                last.as_ref().map(|e| e as &dyn std::error::Error)
            }
        }
    }
}

impl<E> RetryError<E> {
    /// Check if the loop ran out of time.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Check if the loop was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Number of attempts made, when known.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::Permanent(_) => None,
            Self::DeadlineExceeded { attempts, .. } | Self::Cancelled { attempts, .. } => {
                Some(*attempts)
            }
        }
    }

    /// The most relevant underlying error: the permanent one or the last transient one.
    pub fn into_last(self) -> Option<E> {
        match self {
            Self::Permanent(e) => Some(e),
            Self::DeadlineExceeded { last, .. } | Self::Cancelled { last, .. } => last,
        }
    }
}

/// Errors surfaced by [`DeploymentClient`](crate::DeploymentClient).
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Bad or unreachable configuration, or no usable auth mode. Never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// An endpoint round trip failed.
    #[error(transparent)]
    Call(#[from] CallError),
    /// The deployment has no status conditions yet.
    #[error("deployment condition not available")]
    NotReady,
    /// The first status condition reports a degraded deployment.
    #[error("deployment degraded: {0}")]
    Degraded(String),
    /// A retry loop exhausted its time budget.
    #[error(
        "deadline exceeded after {attempts} attempts in {elapsed:?} (budget {budget:?}){}",
        describe_last(.last)
    )]
    DeadlineExceeded {
        attempts: usize,
        elapsed: Duration,
        budget: Duration,
        #[source]
        last: Option<Box<DeployError>>,
    },
    /// The caller cancelled the operation.
    #[error("deployment cancelled after {attempts} attempts{}", describe_last(.last))]
    Cancelled {
        attempts: usize,
        #[source]
        last: Option<Box<DeployError>>,
    },
}

fn describe_last(last: &Option<Box<DeployError>>) -> String {
    match last {
        Some(e) => format!("; last error: {}", e),
        None => String::new(),
    }
}

impl DeployError {
    /// Build a precondition error from anything displayable.
    pub fn precondition(msg: impl fmt::Display) -> Self {
        DeployError::Precondition(msg.to_string())
    }

    /// Retry predicate used by both orchestrator loops.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployError::Call(e) => e.is_retryable(),
            DeployError::NotReady => true,
            _ => false,
        }
    }

    /// Check if a time budget ran out.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, DeployError::DeadlineExceeded { .. })
    }

    /// Borrow the call error if present.
    pub fn as_call(&self) -> Option<&CallError> {
        match self {
            DeployError::Call(e) => Some(e),
            _ => None,
        }
    }

    /// The last failure wrapped by a deadline or cancellation error.
    pub fn last_failure(&self) -> Option<&DeployError> {
        match self {
            DeployError::DeadlineExceeded { last, .. } | DeployError::Cancelled { last, .. } => {
                last.as_deref()
            }
            _ => None,
        }
    }
}

impl From<RetryError<DeployError>> for DeployError {
    fn from(err: RetryError<DeployError>) -> Self {
        match err {
            RetryError::Permanent(e) => e,
            RetryError::DeadlineExceeded { attempts, elapsed, budget, last } => {
                let last = last.map(Box::new);
                DeployError::DeadlineExceeded { attempts, elapsed, budget, last }
            }
            RetryError::Cancelled { attempts, last } => {
                DeployError::Cancelled { attempts, last: last.map(Box::new) }
            }
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "http")]
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}
