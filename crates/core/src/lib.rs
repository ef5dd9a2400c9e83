//! Shared vocabulary of the gantry compute platform.
//!
//! This crate holds the pure data types every other crate agrees on:
//!
//! - [`IdPair`] — the compound (session, job) identity of a job.
//! - [`JobCommand`] / [`Command`] — the wire protocol exchanged between
//!   the scheduler and comps over the events channel.
//! - [`JobPhase`] — the scheduling phase machine.
//!
//! It has zero internal dependencies so it can be used by the scheduler,
//! the comp runtime, and any future CLI tooling alike.

pub mod identity;
pub mod phase;
pub mod protocol;
pub mod types;

pub use identity::IdPair;
pub use phase::JobPhase;
pub use protocol::{Command, JobCommand};
pub use types::Timestamp;
