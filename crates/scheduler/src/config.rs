use std::time::Duration;

/// Timeout and sweep knobs of the scheduling engine.
///
/// The engine treats these as opaque durations; how they are sourced is up
/// to the embedding process. Defaults are suitable for development.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long a job may sit scheduled without any comp signalling
    /// capability before it is expired as unassignable. Also the window in
    /// which a repeated `schedule_job` call for the same identity is
    /// suppressed.
    pub wait_timeout: Duration,
    /// Period of the job timer that sweeps for timed-out jobs.
    pub job_timer_interval: Duration,
    /// How long a running job may go without a heartbeat before the comp
    /// is presumed lost.
    pub heartbeat_lost_timeout: Duration,
}

impl SchedulerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                 | Default |
    /// |-----------------------------------------|---------|
    /// | `SCHEDULER_WAIT_TIMEOUT_SECS`           | `60`    |
    /// | `SCHEDULER_JOB_TIMER_INTERVAL_SECS`     | `5`     |
    /// | `SCHEDULER_HEARTBEAT_LOST_TIMEOUT_SECS` | `60`    |
    pub fn from_env() -> Self {
        Self {
            wait_timeout: env_secs("SCHEDULER_WAIT_TIMEOUT_SECS", 60),
            job_timer_interval: env_secs("SCHEDULER_JOB_TIMER_INTERVAL_SECS", 5),
            heartbeat_lost_timeout: env_secs("SCHEDULER_HEARTBEAT_LOST_TIMEOUT_SECS", 60),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(60),
            job_timer_interval: Duration::from_secs(5),
            heartbeat_lost_timeout: Duration::from_secs(60),
        }
    }
}

fn env_secs(var: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{var} must be a valid number of seconds"));
    Duration::from_secs(secs)
}
