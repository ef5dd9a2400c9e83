//! In-memory table of tracked jobs.
//!
//! [`JobRegistry`] is pure data: a map from [`IdPair`] to [`JobRecord`]
//! plus projections over it (phase filters, per-user slot accounting). It
//! does no I/O and no locking of its own; the engine owns the mutual
//! exclusion.

use std::collections::HashMap;
use std::time::Duration;

use gantry_core::phase::can_transition;
use gantry_core::{IdPair, JobPhase, Timestamp};

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Scheduling state of one tracked job.
///
/// Field mutation goes through methods so the phase can only move forward
/// and the offered flag can only be set while the job is still scheduled.
#[derive(Debug, Clone)]
pub struct JobRecord {
    user_id: String,
    slots: u32,
    phase: JobPhase,
    scheduled_at: Timestamp,
    last_heartbeat_at: Option<Timestamp>,
    runnable_since: Option<Timestamp>,
    has_been_offered: bool,
}

impl JobRecord {
    fn new(user_id: &str, slots: u32, phase: JobPhase, now: Timestamp) -> Self {
        Self {
            user_id: user_id.to_string(),
            // A job always costs at least one slot.
            slots: slots.max(1),
            phase,
            scheduled_at: now,
            last_heartbeat_at: None,
            runnable_since: None,
            has_been_offered: false,
        }
    }

    /// A job registered by the caller but not yet dispatched.
    pub fn fresh(user_id: &str, slots: u32, now: Timestamp) -> Self {
        Self::new(user_id, slots, JobPhase::New, now)
    }

    /// A job whose SCHEDULE broadcast is going out now.
    pub fn scheduled(user_id: &str, slots: u32, now: Timestamp) -> Self {
        Self::new(user_id, slots, JobPhase::Scheduled, now)
    }

    /// A job discovered already executing, e.g. after a scheduler restart.
    pub fn running(user_id: &str, slots: u32, now: Timestamp) -> Self {
        let mut record = Self::new(user_id, slots, JobPhase::Running, now);
        record.has_been_offered = true;
        record.last_heartbeat_at = Some(now);
        record
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn has_been_offered(&self) -> bool {
        self.has_been_offered
    }

    /// Whether some comp has demonstrated capability to run this job.
    pub fn is_runnable(&self) -> bool {
        self.runnable_since.is_some()
    }

    /// Time since the last SCHEDULE broadcast for this job.
    ///
    /// Saturates to zero if `now` is earlier than the stored timestamp.
    pub fn time_since_scheduled(&self, now: Timestamp) -> Duration {
        (now - self.scheduled_at).to_std().unwrap_or_default()
    }

    /// Time since the last heartbeat, `None` until a comp was chosen.
    pub fn time_since_heartbeat(&self, now: Timestamp) -> Option<Duration> {
        self.last_heartbeat_at
            .map(|at| (now - at).to_std().unwrap_or_default())
    }

    /// Refresh the record for another SCHEDULE broadcast.
    ///
    /// Moves a `New` record to `Scheduled`; on a still-scheduled record the
    /// offered flag is cleared so the new round of offers can win. A
    /// running job only gets its broadcast timestamp refreshed.
    pub fn reschedule(&mut self, now: Timestamp) {
        self.scheduled_at = now;
        if can_transition(self.phase, JobPhase::Scheduled) {
            self.phase = JobPhase::Scheduled;
        }
        if self.phase == JobPhase::Scheduled {
            self.has_been_offered = false;
        }
    }

    /// Accept a comp's offer: first offer wins.
    ///
    /// Returns `true` when this call accepted the offer; `false` when an
    /// offer was already accepted or the job's SCHEDULE round has not gone
    /// out. On acceptance the heartbeat timestamp is stamped immediately
    /// so the sweep cannot race the CHOOSE point-cast.
    pub fn accept_offer(&mut self, now: Timestamp) -> bool {
        if self.has_been_offered || self.phase != JobPhase::Scheduled {
            return false;
        }
        self.has_been_offered = true;
        self.phase = JobPhase::Running;
        self.last_heartbeat_at = Some(now);
        true
    }

    /// Record that a comp is capable of running the job later.
    pub fn mark_runnable(&mut self, now: Timestamp) {
        self.runnable_since = Some(now);
    }

    /// Refresh the heartbeat timestamp.
    pub fn touch_heartbeat(&mut self, now: Timestamp) {
        self.last_heartbeat_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Map of all jobs the scheduler currently tracks.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<IdPair, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id_pair: &IdPair) -> Option<&JobRecord> {
        self.jobs.get(id_pair)
    }

    pub fn get_mut(&mut self, id_pair: &IdPair) -> Option<&mut JobRecord> {
        self.jobs.get_mut(id_pair)
    }

    /// Track a job the caller has registered but not yet dispatched.
    pub fn add_new_job(&mut self, id_pair: IdPair, user_id: &str, slots: u32, now: Timestamp) {
        self.jobs.insert(id_pair, JobRecord::fresh(user_id, slots, now));
    }

    /// Track a job whose SCHEDULE broadcast is going out now.
    pub fn add_scheduled_job(&mut self, id_pair: IdPair, user_id: &str, slots: u32, now: Timestamp) {
        self.jobs
            .insert(id_pair, JobRecord::scheduled(user_id, slots, now));
    }

    /// Track a job discovered already executing on a comp.
    pub fn add_running_job(&mut self, id_pair: IdPair, user_id: &str, slots: u32, now: Timestamp) {
        self.jobs
            .insert(id_pair, JobRecord::running(user_id, slots, now));
    }

    pub fn remove(&mut self, id_pair: &IdPair) -> Option<JobRecord> {
        self.jobs.remove(id_pair)
    }

    /// Whether any tracked job, in any session, carries this job id.
    pub fn contains_job_id(&self, job_id: uuid::Uuid) -> bool {
        self.jobs.keys().any(|id| id.job_id == job_id)
    }

    /// Identities of all jobs currently in the given phase.
    pub fn ids_in_phase(&self, phase: JobPhase) -> Vec<IdPair> {
        self.jobs
            .iter()
            .filter(|(_, record)| record.phase() == phase)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn count_in_phase(&self, phase: JobPhase) -> usize {
        self.jobs
            .values()
            .filter(|record| record.phase() == phase)
            .count()
    }

    /// Sum of slots reserved by `user_id`'s jobs in the given phase.
    ///
    /// Recomputed on every call; the registry stays small, bounded by
    /// concurrently active jobs.
    pub fn slots_in_use(&self, phase: JobPhase, user_id: &str) -> u32 {
        self.jobs
            .values()
            .filter(|record| record.phase() == phase && record.user_id() == user_id)
            .map(JobRecord::slots)
            .sum()
    }

    pub fn new_slots(&self, user_id: &str) -> u32 {
        self.slots_in_use(JobPhase::New, user_id)
    }

    pub fn scheduled_slots(&self, user_id: &str) -> u32 {
        self.slots_in_use(JobPhase::Scheduled, user_id)
    }

    pub fn running_slots(&self, user_id: &str) -> u32 {
        self.slots_in_use(JobPhase::Running, user_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
