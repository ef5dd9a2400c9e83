//! The offer-protocol scheduling engine.
//!
//! [`OfferScheduler`] owns the [`JobRegistry`] behind one coarse lock,
//! reacts to comp replies, and runs a periodic sweep that expires jobs
//! whose comp went silent or that no comp could take. Contention is not
//! the bottleneck at registry sizes bounded by concurrently active jobs;
//! atomic check-then-act sequences such as first-offer-wins are.
//!
//! Publishing to the hub is fire-and-forget and never blocks, so commands
//! may go out from inside the critical section. Callbacks to the platform
//! are always invoked with the lock released: the callback may re-enter
//! [`OfferScheduler::schedule_job`] on the same call stack, and the lock
//! is not re-entrant.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gantry_core::{Command, IdPair, JobCommand, JobPhase};
use gantry_events::CompHub;

use crate::callback::SchedulerCallback;
use crate::config::SchedulerConfig;
use crate::registry::JobRegistry;

/// Reason reported when a running job stops heartbeating.
const REASON_HEARTBEAT_LOST: &str = "heartbeat lost";
/// Reason reported when no comp ever signalled capability in time.
const REASON_NO_WORKER: &str = "no worker available";
/// Reason reported when a job id is reused under a different session.
const REASON_NON_UNIQUE_JOB_ID: &str = "non-unique jobId";

/// Snapshot of engine state for operational monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub scheduled_job_count: usize,
    pub running_job_count: usize,
}

/// Matches pending jobs to comps with the SCHEDULE -> OFFER/BUSY -> CHOOSE
/// exchange and watches RUNNING heartbeats afterwards.
///
/// Constructed per process and injected into the surrounding service, so
/// tests can run isolated instances side by side.
pub struct OfferScheduler {
    jobs: Mutex<JobRegistry>,
    hub: Arc<CompHub>,
    callback: Arc<dyn SchedulerCallback>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl OfferScheduler {
    /// Create an engine without starting its background tasks.
    ///
    /// Useful for tests that drive the protocol by hand; production code
    /// should use [`OfferScheduler::start`].
    pub fn new(
        config: SchedulerConfig,
        hub: Arc<CompHub>,
        callback: Arc<dyn SchedulerCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(JobRegistry::new()),
            hub,
            callback,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Create an engine and start the reply pump and the job timer.
    pub fn start(
        config: SchedulerConfig,
        hub: Arc<CompHub>,
        callback: Arc<dyn SchedulerCallback>,
    ) -> Arc<Self> {
        let engine = Self::new(config, hub, callback);
        engine.spawn_reply_pump();
        engine.spawn_job_timer();
        engine
    }

    /// Stop the background tasks. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // -- public contract ----------------------------------------------------

    /// Dispatch a job to the comp pool.
    ///
    /// No value is returned; the outcome arrives asynchronously as comp
    /// replies or, on failure, through [`SchedulerCallback::expire`]. A
    /// repeated call for the same identity within the wait timeout is a
    /// no-op, which absorbs duplicate re-submission storms.
    pub fn schedule_job(&self, id_pair: IdPair, user_id: &str, slots: u32) {
        let now = Utc::now();
        let mut jobs = self.jobs();

        if jobs.get(&id_pair).is_none() && jobs.contains_job_id(id_pair.job_id) {
            drop(jobs);
            tracing::info!(job = %id_pair, "Rejecting job, non-unique job ids are not supported");
            self.callback.expire(id_pair, REASON_NON_UNIQUE_JOB_ID);
            return;
        }

        let just_scheduled = jobs
            .get(&id_pair)
            .is_some_and(|record| record.time_since_scheduled(now) < self.config.wait_timeout);
        if just_scheduled {
            tracing::info!(job = %id_pair, "Job was just scheduled, not scheduling again");
            return;
        }

        if let Some(record) = jobs.get_mut(&id_pair) {
            record.reschedule(now);
        } else {
            jobs.add_scheduled_job(id_pair, user_id, slots, now);
        }

        tracing::info!(job = %id_pair, user = user_id, slots, "Scheduling job");
        self.hub.broadcast(JobCommand::schedule(id_pair));
    }

    /// Cancel a job that was cancelled or deleted by the caller.
    ///
    /// The CANCEL broadcast goes out unconditionally so a comp already
    /// executing the job stops too; handling it here covers waiting and
    /// running jobs alike. Cancelling an unknown job is a no-op after the
    /// broadcast.
    pub fn cancel_job(&self, id_pair: IdPair) {
        self.hub.broadcast(JobCommand::cancel(id_pair));

        tracing::info!(job = %id_pair, "Cancelling job");
        self.jobs().remove(&id_pair);
    }

    /// Stop tracking a job that finished on its own.
    ///
    /// No broadcast: the comp that ran it already knows the job ended.
    pub fn remove_finished_job(&self, id_pair: IdPair) {
        self.jobs().remove(&id_pair);
    }

    /// Track a job discovered already executing, e.g. while reconciling
    /// state after a scheduler restart.
    pub fn track_running_job(&self, id_pair: IdPair, user_id: &str, slots: u32) {
        tracing::info!(job = %id_pair, user = user_id, "Tracking already-running job");
        self.jobs()
            .add_running_job(id_pair, user_id, slots, Utc::now());
    }

    /// Per-user slot usage in one phase, for the caller's admission
    /// decisions.
    pub fn slots_in_use(&self, phase: JobPhase, user_id: &str) -> u32 {
        self.jobs().slots_in_use(phase, user_id)
    }

    /// Current job counts for monitoring.
    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs();
        SchedulerStatus {
            scheduled_job_count: jobs.count_in_phase(JobPhase::Scheduled),
            running_job_count: jobs.count_in_phase(JobPhase::Running),
        }
    }

    // -- comp replies -------------------------------------------------------

    /// React to one message from the comp pool.
    pub fn on_comp_message(&self, message: JobCommand) {
        let id_pair = message.id_pair();

        match message.command {
            Command::Offer => self.on_offer(id_pair, message.worker_id),
            Command::Busy => self.on_busy(id_pair, message.worker_id),
            Command::Running => self.on_running(id_pair),
            Command::Available => {
                // No registry lock here: the callback may re-enter
                // schedule_job on this call stack.
                tracing::debug!(comp = ?message.worker_id, "Comp capacity available");
                self.callback.new_resources_available();
            }
            Command::Schedule | Command::Cancel | Command::Choose => {
                tracing::warn!(job = %id_pair, command = ?message.command, "Ignoring scheduler command echoed back from the channel");
            }
        }
    }

    /// A comp is immediately willing to run the job: first offer wins.
    fn on_offer(&self, id_pair: IdPair, comp_id: Option<Uuid>) {
        let Some(comp_id) = comp_id else {
            tracing::warn!(job = %id_pair, "Offer without a comp id");
            return;
        };

        let mut jobs = self.jobs();
        match jobs.get_mut(&id_pair) {
            Some(record) => {
                if record.accept_offer(Utc::now()) {
                    tracing::info!(job = %id_pair, comp = %comp_id, "Offer chosen");
                    self.hub.send_to_comp(comp_id, JobCommand::choose(id_pair, comp_id));
                } else {
                    tracing::debug!(job = %id_pair, comp = %comp_id, "Ignoring offer, one was already accepted");
                }
            }
            None => {
                tracing::warn!(job = %id_pair, comp = %comp_id, "Offer for an unknown job");
            }
        }
    }

    /// A comp could run the job later; suppress the unassignable expiry.
    fn on_busy(&self, id_pair: IdPair, comp_id: Option<Uuid>) {
        let mut jobs = self.jobs();
        match jobs.get_mut(&id_pair) {
            Some(record) if record.phase() == JobPhase::Scheduled => {
                tracing::info!(job = %id_pair, comp = ?comp_id, "Job is runnable but comps are busy");
                record.mark_runnable(Utc::now());
            }
            Some(_) => {}
            None => {
                tracing::warn!(job = %id_pair, comp = ?comp_id, "Busy reply for an unknown job");
            }
        }
    }

    /// Heartbeat from the comp executing the job.
    fn on_running(&self, id_pair: IdPair) {
        let mut jobs = self.jobs();
        match jobs.get_mut(&id_pair) {
            Some(record) => {
                tracing::debug!(job = %id_pair, "Job heartbeat");
                record.touch_heartbeat(Utc::now());
            }
            None => {
                tracing::warn!(job = %id_pair, "Heartbeat for an unknown job");
            }
        }
    }

    // -- job timer ----------------------------------------------------------

    /// One sweep over the registry: expire running jobs whose heartbeat
    /// lapsed and scheduled jobs no comp ever claimed to be capable of.
    fn expire_timed_out_jobs(&self) {
        let now = Utc::now();
        let mut expired: Vec<(IdPair, &'static str)> = Vec::new();

        {
            let mut jobs = self.jobs();

            for id_pair in jobs.ids_in_phase(JobPhase::Running) {
                let lost = jobs
                    .get(&id_pair)
                    .and_then(|record| record.time_since_heartbeat(now))
                    .is_some_and(|since| since > self.config.heartbeat_lost_timeout);
                if lost {
                    jobs.remove(&id_pair);
                    expired.push((id_pair, REASON_HEARTBEAT_LOST));
                }
            }

            for id_pair in jobs.ids_in_phase(JobPhase::Scheduled) {
                let unassignable = jobs.get(&id_pair).is_some_and(|record| {
                    record.time_since_scheduled(now) > self.config.wait_timeout
                        && !record.is_runnable()
                });
                if unassignable {
                    jobs.remove(&id_pair);
                    expired.push((id_pair, REASON_NO_WORKER));
                }
            }
        }

        for (id_pair, reason) in expired {
            tracing::warn!(job = %id_pair, reason, "Job expired");
            self.callback.expire(id_pair, reason);
        }
    }

    /// Spawn the periodic sweep.
    ///
    /// A panicking tick is caught and logged so a single bad iteration can
    /// never disable failure detection for good.
    fn spawn_job_timer(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.job_timer_interval);
            tracing::info!(
                interval_ms = engine.config.job_timer_interval.as_millis() as u64,
                "Job timer started",
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Job timer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let tick = std::panic::catch_unwind(AssertUnwindSafe(|| {
                            engine.expire_timed_out_jobs();
                        }));
                        if let Err(panic) = tick {
                            tracing::error!(panic = panic_message(&panic), "Error in job timer tick");
                        }
                    }
                }
            }
        });
    }

    /// Forward comp replies from the hub into the engine.
    fn spawn_reply_pump(self: &Arc<Self>) {
        let Some(mut replies) = self.hub.take_reply_stream() else {
            tracing::warn!("Reply stream already taken, comp messages will not reach this engine");
            return;
        };

        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = replies.recv() => match message {
                        Some(message) => engine.on_comp_message(message),
                        None => break,
                    },
                }
            }
        });
    }

    fn jobs(&self) -> MutexGuard<'_, JobRegistry> {
        // A poisoning panic cannot leave a half-updated record: every
        // operation completes its checks before it mutates.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
