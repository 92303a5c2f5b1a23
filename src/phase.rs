//! Phases of a deployment call, as reported in logs and outcome events.

use std::fmt;

/// States of one orchestrator call.
///
/// `Preparing → Creating → AwaitingStatus → Succeeded | Failed | TimedOut`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployPhase {
    Preparing,
    Creating,
    AwaitingStatus,
    Succeeded,
    Failed,
    TimedOut,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::Preparing => "preparing",
            DeployPhase::Creating => "creating",
            DeployPhase::AwaitingStatus => "awaiting_status",
            DeployPhase::Succeeded => "succeeded",
            DeployPhase::Failed => "failed",
            DeployPhase::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployPhase::Succeeded | DeployPhase::Failed | DeployPhase::TimedOut)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
