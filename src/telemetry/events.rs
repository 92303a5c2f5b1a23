//! Deployment telemetry events.

use crate::phase::DeployPhase;
use std::fmt;
use std::time::Duration;

/// Coarse cause label attached to every terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeCause {
    /// The deployment reached a healthy condition.
    Ok,
    /// Anything else: precondition, remote, degraded, timeout or cancellation.
    Internal,
}

impl OutcomeCause {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeCause::Ok => "OK",
            OutcomeCause::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for OutcomeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events emitted by the deployment client.
///
/// Every orchestrator call emits exactly one [`DeployEvent::Outcome`]. Successful calls also
/// emit one [`DeployEvent::Completed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    /// A call reached a terminal phase.
    Outcome {
        cause: OutcomeCause,
        /// Terminal phase the call ended in.
        phase: DeployPhase,
    },
    /// A deployment finished successfully.
    Completed {
        /// Wall-clock time since the caller's context started.
        duration: Duration,
        /// Whether the deployment belongs to the internal prober project.
        prober: bool,
    },
}

impl fmt::Display for DeployEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployEvent::Outcome { cause, phase } => {
                write!(f, "Outcome({}, phase={})", cause, phase)
            }
            DeployEvent::Completed { duration, prober } => {
                write!(f, "Completed(duration={:?}, prober={})", duration, prober)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_display_carries_label_and_phase() {
        let event =
            DeployEvent::Outcome { cause: OutcomeCause::Internal, phase: DeployPhase::TimedOut };
        let text = event.to_string();
        assert!(text.contains("INTERNAL"));
        assert!(text.contains("timed_out"));
    }

    #[test]
    fn completed_display() {
        let event = DeployEvent::Completed { duration: Duration::from_secs(3), prober: true };
        assert_eq!(event.to_string(), "Completed(duration=3s, prober=true)");
    }
}
