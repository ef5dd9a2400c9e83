//! Behaviour tests for the public scheduling contract: dispatch,
//! duplicate suppression, cancellation and removal.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

use common::{id_pair, RecordingCallback};
use gantry_core::{Command, IdPair, JobCommand};
use gantry_events::CompHub;
use gantry_scheduler::{OfferScheduler, SchedulerCallback, SchedulerConfig};

fn engine_with_comp() -> (
    Arc<OfferScheduler>,
    Arc<CompHub>,
    Arc<RecordingCallback>,
    tokio::sync::mpsc::UnboundedReceiver<JobCommand>,
    Uuid,
) {
    let hub = Arc::new(CompHub::new());
    let callback = Arc::new(RecordingCallback::new());
    let comp_id = Uuid::new_v4();
    let comp_rx = hub.register_comp(comp_id);
    let engine = OfferScheduler::new(SchedulerConfig::default(), Arc::clone(&hub), callback.clone());
    (engine, hub, callback, comp_rx, comp_id)
}

// ---------------------------------------------------------------------------
// Test: schedule_job broadcasts SCHEDULE and tracks the job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_job_broadcasts_and_tracks() {
    let (engine, _hub, callback, mut comp_rx, _) = engine_with_comp();
    let job = id_pair();

    engine.schedule_job(job, "alice", 1);

    let message = comp_rx.try_recv().expect("comp should see the broadcast");
    assert_eq!(message.command, Command::Schedule);
    assert_eq!(message.id_pair(), job);
    assert!(message.worker_id.is_none());

    assert_eq!(engine.status().scheduled_job_count, 1);
    assert!(callback.expired().is_empty());
    assert_eq!(callback.available_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: re-scheduling within the wait timeout is suppressed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reschedule_within_wait_timeout_is_suppressed() {
    let (engine, _hub, _callback, mut comp_rx, _) = engine_with_comp();
    let job = id_pair();

    engine.schedule_job(job, "alice", 1);
    engine.schedule_job(job, "alice", 1);

    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Schedule);
    assert_matches!(comp_rx.try_recv(), Err(TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Test: re-scheduling after the wait timeout broadcasts again
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reschedule_after_wait_timeout_broadcasts_again() {
    let hub = Arc::new(CompHub::new());
    let callback = Arc::new(RecordingCallback::new());
    let mut comp_rx = hub.register_comp(Uuid::new_v4());
    let config = SchedulerConfig {
        wait_timeout: Duration::ZERO,
        ..SchedulerConfig::default()
    };
    let engine = OfferScheduler::new(config, Arc::clone(&hub), callback);
    let job = id_pair();

    engine.schedule_job(job, "alice", 1);
    engine.schedule_job(job, "alice", 1);

    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Schedule);
    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Schedule);
}

// ---------------------------------------------------------------------------
// Test: a reused job id under a different session is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_job_id_across_sessions_is_expired() {
    let (engine, _hub, callback, mut comp_rx, _) = engine_with_comp();

    let first = id_pair();
    let second = IdPair::new(Uuid::new_v4(), first.job_id);

    engine.schedule_job(first, "alice", 1);
    engine.schedule_job(second, "bob", 1);

    let expired = callback.expired();
    assert_eq!(expired, vec![(second, "non-unique jobId".to_string())]);

    // The first submission is unaffected and was the only broadcast.
    assert_eq!(engine.status().scheduled_job_count, 1);
    assert_eq!(comp_rx.try_recv().unwrap().id_pair(), first);
    assert_matches!(comp_rx.try_recv(), Err(TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Test: cancel broadcasts CANCEL and removes the job in any phase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_broadcasts_and_removes() {
    let (engine, _hub, callback, mut comp_rx, comp_id) = engine_with_comp();
    let job = id_pair();

    engine.schedule_job(job, "alice", 1);
    engine.on_comp_message(JobCommand::offer(job, comp_id));
    assert_eq!(engine.status().running_job_count, 1);

    engine.cancel_job(job);

    let commands: Vec<Command> = std::iter::from_fn(|| comp_rx.try_recv().ok())
        .map(|message| message.command)
        .collect();
    assert_eq!(
        commands,
        vec![Command::Schedule, Command::Choose, Command::Cancel]
    );

    assert_eq!(engine.status().running_job_count, 0);
    assert_eq!(engine.status().scheduled_job_count, 0);
    assert!(callback.expired().is_empty());
}

// ---------------------------------------------------------------------------
// Test: cancelling an unknown job still broadcasts and does not fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_unknown_job_is_a_noop_after_the_broadcast() {
    let (engine, _hub, callback, mut comp_rx, _) = engine_with_comp();
    let job = id_pair();

    engine.cancel_job(job);
    engine.cancel_job(job);

    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Cancel);
    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Cancel);
    assert!(callback.expired().is_empty());
}

// ---------------------------------------------------------------------------
// Test: removing a finished job does not broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_finished_job_removes_without_broadcast() {
    let (engine, _hub, _callback, mut comp_rx, _) = engine_with_comp();
    let job = id_pair();

    engine.schedule_job(job, "alice", 1);
    assert_eq!(comp_rx.try_recv().unwrap().command, Command::Schedule);

    engine.remove_finished_job(job);

    assert_eq!(engine.status().scheduled_job_count, 0);
    assert_matches!(comp_rx.try_recv(), Err(TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Test: already-running jobs enter the registry as RUNNING
// ---------------------------------------------------------------------------

#[tokio::test]
async fn track_running_job_counts_toward_running_slots() {
    let (engine, _hub, _callback, _comp_rx, _) = engine_with_comp();
    let job = id_pair();

    engine.track_running_job(job, "alice", 3);

    assert_eq!(engine.status().running_job_count, 1);
    assert_eq!(
        engine.slots_in_use(gantry_core::JobPhase::Running, "alice"),
        3
    );
    assert_eq!(engine.slots_in_use(gantry_core::JobPhase::Running, "bob"), 0);
}

// ---------------------------------------------------------------------------
// Test: the AVAILABLE callback may re-enter schedule_job synchronously
// ---------------------------------------------------------------------------

/// Schedules a fixed backlog job from inside the callback, the way the
/// platform's job layer re-attempts its pending queue.
#[derive(Default)]
struct ReschedulingCallback {
    engine: Mutex<Option<Arc<OfferScheduler>>>,
    backlog_job: Mutex<Option<IdPair>>,
}

impl SchedulerCallback for ReschedulingCallback {
    fn expire(&self, _id_pair: IdPair, _reason: &str) {}

    fn new_resources_available(&self) {
        let engine = self.engine.lock().unwrap().clone();
        let job = *self.backlog_job.lock().unwrap();
        if let (Some(engine), Some(job)) = (engine, job) {
            engine.schedule_job(job, "alice", 1);
        }
    }
}

#[tokio::test]
async fn available_callback_can_reenter_schedule_job() {
    let hub = Arc::new(CompHub::new());
    let comp_id = Uuid::new_v4();
    let mut comp_rx = hub.register_comp(comp_id);

    let callback = Arc::new(ReschedulingCallback::default());
    let engine = OfferScheduler::new(
        SchedulerConfig::default(),
        Arc::clone(&hub),
        callback.clone(),
    );

    let backlog = id_pair();
    *callback.engine.lock().unwrap() = Some(Arc::clone(&engine));
    *callback.backlog_job.lock().unwrap() = Some(backlog);

    // Must not deadlock even though the callback calls straight back in.
    engine.on_comp_message(JobCommand::available(id_pair(), comp_id));

    let message = comp_rx.try_recv().expect("backlog job should be dispatched");
    assert_eq!(message.command, Command::Schedule);
    assert_eq!(message.id_pair(), backlog);
}
