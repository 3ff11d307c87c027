// Startup metrics module
//
// Lightweight timing and counters for the startup sequence and the instance inbox

use crate::services::startup::Stage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Startup and invocation metrics
///
/// Uses atomic operations so the application loop and the instance inbox can
/// record without locks. A summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Invocations that opened at least one target
    pub invocations_opened: AtomicU64,

    /// Invocations without targets (plain activation)
    pub activations: AtomicU64,

    /// Invocations forwarded by secondary instances
    pub invocations_forwarded: AtomicU64,

    /// Duration of each startup stage in microseconds, indexed by [`Stage::index`]
    stage_time_us: [AtomicU64; 5],

    /// Process start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance measuring uptime from `start_time`
    pub fn new(start_time: Instant) -> Self {
        Self {
            invocations_opened: AtomicU64::new(0),
            activations: AtomicU64::new(0),
            invocations_forwarded: AtomicU64::new(0),
            stage_time_us: Default::default(),
            start_time,
        }
    }

    /// Record how long a startup stage took
    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        self.stage_time_us[stage.index()].store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a handled invocation
    pub fn record_invocation(&self, activation: bool, forwarded: bool) {
        if activation {
            self.activations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.invocations_opened.fetch_add(1, Ordering::Relaxed);
        }
        if forwarded {
            self.invocations_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stage_time(&self, stage: Stage) -> Duration {
        Duration::from_micros(self.stage_time_us[stage.index()].load(Ordering::Relaxed))
    }

    /// Sum of all recorded stage durations
    pub fn startup_time(&self) -> Duration {
        Stage::ORDER.iter().map(|stage| self.stage_time(*stage)).sum()
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::debug!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        for stage in Stage::ORDER {
            tracing::debug!(
                "Stage '{}': {:.3}ms",
                stage,
                self.stage_time(stage).as_secs_f64() * 1000.0
            );
        }
        tracing::debug!(
            "Invocations: {} opened, {} activations, {} forwarded",
            self.invocations_opened.load(Ordering::Relaxed),
            self.activations.load(Ordering::Relaxed),
            self.invocations_forwarded.load(Ordering::Relaxed)
        );
    }
}
