//! Shared helpers for the scheduler behaviour tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use gantry_core::IdPair;
use gantry_scheduler::{SchedulerCallback, SchedulerConfig};

/// Callback double that records every invocation for later assertions.
#[derive(Default)]
pub struct RecordingCallback {
    expired: Mutex<Vec<(IdPair, String)>>,
    available: AtomicUsize,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expired(&self) -> Vec<(IdPair, String)> {
        self.expired.lock().unwrap().clone()
    }

    pub fn available_count(&self) -> usize {
        self.available.load(Ordering::SeqCst)
    }
}

impl SchedulerCallback for RecordingCallback {
    fn expire(&self, id_pair: IdPair, reason: &str) {
        self.expired
            .lock()
            .unwrap()
            .push((id_pair, reason.to_string()));
    }

    fn new_resources_available(&self) {
        self.available.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn id_pair() -> IdPair {
    IdPair::new(Uuid::new_v4(), Uuid::new_v4())
}

/// Timeouts short enough for the expiry tests to observe within a second.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        wait_timeout: Duration::from_millis(400),
        job_timer_interval: Duration::from_millis(50),
        heartbeat_lost_timeout: Duration::from_millis(300),
    }
}
