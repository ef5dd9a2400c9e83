//! Message channel between the scheduler and the comp pool.
//!
//! The platform's real transport is an authenticated pub/sub channel; this
//! crate provides its in-process face with the exact semantics the
//! scheduler relies on:
//!
//! - [`CompHub`] — broadcast and point-cast of
//!   [`JobCommand`](gantry_core::JobCommand)s to registered comps, plus a
//!   single reply stream flowing back to the scheduler.
//!
//! Delivery is at-most-once and fire-and-forget; ordering is FIFO per
//! sender only.

pub mod hub;

pub use hub::CompHub;
