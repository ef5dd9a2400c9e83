use gantry_core::IdPair;

/// The scheduler's seam to the surrounding platform.
///
/// Implemented by whatever owns job persistence and client notification
/// (in the full platform, the REST job layer). The engine never holds its
/// registry lock while invoking a callback, so implementations may call
/// back into the scheduler synchronously.
pub trait SchedulerCallback: Send + Sync {
    /// The job can no longer be scheduled or is presumed lost.
    ///
    /// The callee is expected to mark the job failed in persistent storage
    /// and notify the client. `reason` is a short human-readable cause,
    /// e.g. `"heartbeat lost"`.
    fn expire(&self, id_pair: IdPair, reason: &str);

    /// A comp announced newly freed capacity.
    ///
    /// The callee should re-attempt scheduling of its backlog of pending
    /// jobs; the engine keeps no backlog of its own.
    fn new_resources_available(&self);
}
