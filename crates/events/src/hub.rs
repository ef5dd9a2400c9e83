//! Comp-facing message hub.
//!
//! [`CompHub`] is the in-process stand-in for the platform's pub/sub
//! transport. The scheduler publishes [`JobCommand`]s through it; comps
//! receive them on per-comp channels and push their replies onto a single
//! stream the scheduler consumes.
//!
//! All sends are non-blocking and fire-and-forget: no acknowledgement is
//! awaited and a message to a closed channel is silently dropped, matching
//! the at-most-once guarantee of the real transport. Locks are synchronous
//! and never held across an await point, so publishing is safe from inside
//! the scheduler's critical section.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use gantry_core::JobCommand;

/// Broadcast/point-cast hub connecting the scheduler with registered comps.
///
/// Designed to be shared via `Arc<CompHub>` between the scheduler, the comp
/// runtimes, and the process bootstrap.
pub struct CompHub {
    /// Command channels of registered comps, keyed by comp id.
    comps: RwLock<HashMap<Uuid, mpsc::UnboundedSender<JobCommand>>>,
    reply_tx: mpsc::UnboundedSender<JobCommand>,
    /// Receiver half of the reply stream, handed out once.
    reply_rx: Mutex<Option<mpsc::UnboundedReceiver<JobCommand>>>,
}

impl CompHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            comps: RwLock::new(HashMap::new()),
            reply_tx,
            reply_rx: Mutex::new(Some(reply_rx)),
        }
    }

    /// Register a comp and return the receiver half of its command channel.
    ///
    /// Registering the same comp id again replaces the previous channel,
    /// which covers a comp reconnecting after a dropped connection.
    pub fn register_comp(&self, comp_id: Uuid) -> mpsc::UnboundedReceiver<JobCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.write_comps().insert(comp_id, tx);
        tracing::info!(comp = %comp_id, "Comp registered");
        rx
    }

    /// Remove a comp's channel. Unknown ids are a no-op.
    pub fn unregister_comp(&self, comp_id: Uuid) {
        self.write_comps().remove(&comp_id);
        tracing::info!(comp = %comp_id, "Comp unregistered");
    }

    /// Deliver a command to every registered comp.
    ///
    /// Comps whose channels are closed are skipped silently; they are
    /// cleaned up when they re-register or unregister.
    pub fn broadcast(&self, command: JobCommand) {
        let comps = self.read_comps();
        if comps.is_empty() {
            tracing::debug!(command = ?command.command, "No comps listening");
            return;
        }
        for sender in comps.values() {
            let _ = sender.send(command);
        }
    }

    /// Deliver a command to one specific comp.
    ///
    /// Returns `false` when the comp is unknown or its channel is closed.
    pub fn send_to_comp(&self, comp_id: Uuid, command: JobCommand) -> bool {
        match self.read_comps().get(&comp_id) {
            Some(sender) => sender.send(command).is_ok(),
            None => {
                tracing::warn!(comp = %comp_id, command = ?command.command, "Point-cast to unknown comp");
                false
            }
        }
    }

    /// Push a comp reply onto the scheduler's stream.
    pub fn reply(&self, command: JobCommand) {
        // Dropped silently if the scheduler is gone; the transport gives
        // the same at-most-once guarantee.
        let _ = self.reply_tx.send(command);
    }

    /// Take the scheduler-side reply stream.
    ///
    /// The stream exists once per hub; subsequent calls return `None`.
    pub fn take_reply_stream(&self) -> Option<mpsc::UnboundedReceiver<JobCommand>> {
        self.reply_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of currently registered comps.
    pub fn comp_count(&self) -> usize {
        self.read_comps().len()
    }

    fn read_comps(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, mpsc::UnboundedSender<JobCommand>>> {
        self.comps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_comps(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, mpsc::UnboundedSender<JobCommand>>> {
        self.comps.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CompHub {
    fn default() -> Self {
        Self::new()
    }
}
