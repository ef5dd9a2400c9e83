//! Wire protocol between the scheduler and comps.
//!
//! Both sides exchange a single message shape, [`JobCommand`], as compact
//! JSON over the events channel. Field names and command values are part of
//! the protocol: older and newer scheduler and comp versions coexist on the
//! same channel, so they must round-trip losslessly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::IdPair;

/// The command kinds of the offer protocol.
///
/// SCHEDULE, CANCEL and CHOOSE flow from the scheduler to comps; OFFER,
/// BUSY, RUNNING and AVAILABLE are comp replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Scheduler asks all comps whether anyone can run this job.
    Schedule,
    /// Scheduler tells all comps to stop working on this job.
    Cancel,
    /// A comp is immediately willing to run the job.
    Offer,
    /// A comp could run the job later but has no free slot right now.
    Busy,
    /// A comp announces newly freed capacity.
    Available,
    /// Heartbeat from the comp executing the job.
    Running,
    /// Scheduler accepts exactly one offer and names the chosen comp.
    Choose,
}

/// One message of the offer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCommand {
    pub session_id: Uuid,
    pub job_id: Uuid,
    /// Identifies a specific comp. Absent on scheduler broadcasts, present
    /// on comp replies and on the CHOOSE point-cast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<Uuid>,
    pub command: Command,
}

impl JobCommand {
    /// SCHEDULE broadcast for a job.
    pub fn schedule(id_pair: IdPair) -> Self {
        Self::broadcast(id_pair, Command::Schedule)
    }

    /// CANCEL broadcast for a job.
    pub fn cancel(id_pair: IdPair) -> Self {
        Self::broadcast(id_pair, Command::Cancel)
    }

    /// CHOOSE point-cast accepting `comp_id`'s offer.
    pub fn choose(id_pair: IdPair, comp_id: Uuid) -> Self {
        Self::from_comp(id_pair, comp_id, Command::Choose)
    }

    /// OFFER reply from a comp willing to run the job now.
    pub fn offer(id_pair: IdPair, comp_id: Uuid) -> Self {
        Self::from_comp(id_pair, comp_id, Command::Offer)
    }

    /// BUSY reply from a comp that is capable but has no free slot.
    pub fn busy(id_pair: IdPair, comp_id: Uuid) -> Self {
        Self::from_comp(id_pair, comp_id, Command::Busy)
    }

    /// RUNNING heartbeat from the comp executing the job.
    pub fn running(id_pair: IdPair, comp_id: Uuid) -> Self {
        Self::from_comp(id_pair, comp_id, Command::Running)
    }

    /// AVAILABLE notification, sent when a comp frees the slot the given
    /// job occupied. The scheduler only cares about the freed capacity.
    pub fn available(id_pair: IdPair, comp_id: Uuid) -> Self {
        Self::from_comp(id_pair, comp_id, Command::Available)
    }

    fn broadcast(id_pair: IdPair, command: Command) -> Self {
        Self {
            session_id: id_pair.session_id,
            job_id: id_pair.job_id,
            worker_id: None,
            command,
        }
    }

    fn from_comp(id_pair: IdPair, comp_id: Uuid, command: Command) -> Self {
        Self {
            session_id: id_pair.session_id,
            job_id: id_pair.job_id,
            worker_id: Some(comp_id),
            command,
        }
    }

    /// The identity of the job this message refers to.
    pub fn id_pair(&self) -> IdPair {
        IdPair::new(self.session_id, self.job_id)
    }
}

/// Parse a wire message into a typed command.
///
/// Returns `Err` for malformed JSON or unknown command values. Receivers
/// should log unknown messages and continue.
pub fn parse_command(text: &str) -> Result<JobCommand, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize a command to its compact JSON wire form.
pub fn to_wire(command: &JobCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}
