//! Comp runtime: the worker side of the offer protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gantry_core::{Command, IdPair, JobCommand};
use gantry_events::CompHub;

use crate::runner::JobRunner;

/// Capacity and heartbeat knobs of one comp.
#[derive(Debug, Clone)]
pub struct CompConfig {
    /// Maximum number of jobs this comp runs concurrently.
    pub max_jobs: usize,
    /// How often a RUNNING heartbeat goes out per executing job.
    pub heartbeat_interval: Duration,
}

impl CompConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `COMP_MAX_JOBS`                | `4`     |
    /// | `COMP_HEARTBEAT_INTERVAL_SECS` | `15`    |
    pub fn from_env() -> Self {
        let max_jobs: usize = std::env::var("COMP_MAX_JOBS")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("COMP_MAX_JOBS must be a valid number");

        let heartbeat_secs: u64 = std::env::var("COMP_HEARTBEAT_INTERVAL_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("COMP_HEARTBEAT_INTERVAL_SECS must be a valid number of seconds");

        Self {
            max_jobs: max_jobs.max(1),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
        }
    }
}

impl Default for CompConfig {
    fn default() -> Self {
        Self {
            max_jobs: 4,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// One comp process: listens for scheduler commands, bids for jobs, runs
/// the chosen ones and reports their liveness.
pub struct Comp {
    comp_id: Uuid,
    config: CompConfig,
    hub: Arc<CompHub>,
    runner: Arc<dyn JobRunner>,
    /// Cancellation tokens of currently executing jobs.
    jobs: Mutex<HashMap<IdPair, CancellationToken>>,
    cancel: CancellationToken,
}

impl Comp {
    /// Register with the hub and start the command loop.
    pub fn start(
        comp_id: Uuid,
        config: CompConfig,
        hub: Arc<CompHub>,
        runner: Arc<dyn JobRunner>,
    ) -> Arc<Self> {
        let commands = hub.register_comp(comp_id);
        let comp = Arc::new(Self {
            comp_id,
            config,
            hub,
            runner,
            jobs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });
        comp.spawn_command_loop(commands);
        tracing::info!(comp = %comp_id, max_jobs = comp.config.max_jobs, "Comp started");
        comp
    }

    pub fn comp_id(&self) -> Uuid {
        self.comp_id
    }

    /// Number of jobs currently executing on this comp.
    pub fn running_job_count(&self) -> usize {
        self.jobs().len()
    }

    /// Stop the command loop and abort all executing jobs.
    pub fn shutdown(&self) {
        tracing::info!(comp = %self.comp_id, "Comp shutting down");
        self.cancel.cancel();
        self.hub.unregister_comp(self.comp_id);
    }

    fn spawn_command_loop(
        self: &Arc<Self>,
        mut commands: tokio::sync::mpsc::UnboundedReceiver<JobCommand>,
    ) {
        let comp = Arc::clone(self);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    command = commands.recv() => match command {
                        Some(command) => comp.handle_command(command),
                        None => break,
                    },
                }
            }
        });
    }

    fn handle_command(self: &Arc<Self>, message: JobCommand) {
        let id_pair = message.id_pair();

        match message.command {
            Command::Schedule => self.bid(id_pair),
            Command::Choose => {
                if message.worker_id == Some(self.comp_id) {
                    self.start_job(id_pair);
                } else {
                    tracing::debug!(job = %id_pair, "Another comp was chosen");
                }
            }
            Command::Cancel => {
                if let Some(token) = self.jobs().get(&id_pair) {
                    tracing::info!(job = %id_pair, "Cancelling job on scheduler request");
                    token.cancel();
                }
            }
            // Replies from other comps; nothing to do with this comp.
            Command::Offer | Command::Busy | Command::Available | Command::Running => {}
        }
    }

    /// Answer a SCHEDULE broadcast with OFFER or BUSY.
    fn bid(&self, id_pair: IdPair) {
        let free = self.jobs().len() < self.config.max_jobs;
        if free {
            tracing::info!(job = %id_pair, comp = %self.comp_id, "Offering to run job");
            self.hub.reply(JobCommand::offer(id_pair, self.comp_id));
        } else {
            tracing::info!(job = %id_pair, comp = %self.comp_id, "All slots taken, replying busy");
            self.hub.reply(JobCommand::busy(id_pair, self.comp_id));
        }
    }

    /// Run a chosen job: heartbeat while it executes, then free the slot
    /// and announce the capacity.
    fn start_job(self: &Arc<Self>, id_pair: IdPair) {
        let job_cancel = self.cancel.child_token();
        {
            let mut jobs = self.jobs();
            if jobs.contains_key(&id_pair) {
                tracing::warn!(job = %id_pair, "Chosen for a job that is already running here");
                return;
            }
            jobs.insert(id_pair, job_cancel.clone());
        }

        tracing::info!(job = %id_pair, comp = %self.comp_id, "Starting job");
        let comp = Arc::clone(self);

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(comp.config.heartbeat_interval);
            let run = comp.runner.run(id_pair);
            tokio::pin!(run);

            loop {
                tokio::select! {
                    _ = job_cancel.cancelled() => {
                        tracing::info!(job = %id_pair, "Job cancelled");
                        break;
                    }
                    result = &mut run => {
                        match result {
                            Ok(()) => tracing::info!(job = %id_pair, "Job finished"),
                            Err(e) => tracing::warn!(job = %id_pair, error = %e, "Job failed"),
                        }
                        break;
                    }
                    _ = heartbeat.tick() => {
                        comp.hub.reply(JobCommand::running(id_pair, comp.comp_id));
                    }
                }
            }

            comp.jobs().remove(&id_pair);
            comp.hub.reply(JobCommand::available(id_pair, comp.comp_id));
        });
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<IdPair, CancellationToken>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
