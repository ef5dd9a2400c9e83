//! Scheduling phase machine.
//!
//! A tracked job moves through at most three phases; removal from the
//! registry is the only way out and is not a phase of its own.

use serde::{Deserialize, Serialize};

/// Scheduling phase of a tracked job.
///
/// Transitions are strictly forward: `New -> Scheduled -> Running`. A job
/// never moves backwards; re-scheduling refreshes timestamps on the record
/// instead of regressing the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    /// Registered by the caller, not yet dispatched to comps.
    New,
    /// A SCHEDULE command has been broadcast; waiting for a usable offer.
    Scheduled,
    /// Exactly one comp has been chosen and heartbeats are expected.
    Running,
}

impl JobPhase {
    fn rank(self) -> u8 {
        match self {
            JobPhase::New => 0,
            JobPhase::Scheduled => 1,
            JobPhase::Running => 2,
        }
    }
}

/// Check whether a phase transition moves forward.
pub fn can_transition(from: JobPhase, to: JobPhase) -> bool {
    to.rank() > from.rank()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_to_scheduled() {
        assert!(can_transition(JobPhase::New, JobPhase::Scheduled));
    }

    #[test]
    fn scheduled_to_running() {
        assert!(can_transition(JobPhase::Scheduled, JobPhase::Running));
    }

    #[test]
    fn new_to_running() {
        assert!(can_transition(JobPhase::New, JobPhase::Running));
    }

    #[test]
    fn running_to_scheduled_is_invalid() {
        assert!(!can_transition(JobPhase::Running, JobPhase::Scheduled));
    }

    #[test]
    fn scheduled_to_new_is_invalid() {
        assert!(!can_transition(JobPhase::Scheduled, JobPhase::New));
    }

    #[test]
    fn self_transition_is_invalid() {
        assert!(!can_transition(JobPhase::Scheduled, JobPhase::Scheduled));
    }
}
