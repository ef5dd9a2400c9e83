//! Comp: an autonomous process that executes jobs for the scheduler.
//!
//! A comp talks to the scheduler only through the events channel. It
//! answers SCHEDULE broadcasts with OFFER or BUSY depending on free
//! capacity, runs the jobs it is CHOSEN for through a pluggable
//! [`JobRunner`], emits RUNNING heartbeats while a job executes, and
//! announces AVAILABLE whenever a slot frees up.

pub mod comp;
pub mod runner;

pub use comp::{Comp, CompConfig};
pub use runner::{JobRunner, RunError, SimulatedRunner};
