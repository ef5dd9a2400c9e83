//! Compound job identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity of a job: the session it belongs to plus the job id itself.
///
/// Both halves are assigned by the caller before the job is handed to the
/// scheduler and never change afterwards. Job ids are expected to be unique
/// across sessions; the scheduler rejects submissions that reuse a job id
/// under a different session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdPair {
    pub session_id: Uuid,
    pub job_id: Uuid,
}

impl IdPair {
    pub fn new(session_id: Uuid, job_id: Uuid) -> Self {
        Self { session_id, job_id }
    }
}

impl fmt::Display for IdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.session_id, self.job_id)
    }
}
