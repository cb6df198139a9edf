//! Progress and ETA bookkeeping for the running translation job.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::trace;

/// What callers see when they poll progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
    pub avg_seconds_per_unit: f64,
    pub eta_seconds: f64,
}

/// Counts processed units and estimates the time left from the running average.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    started: Option<Instant>,
    snapshot: ProgressSnapshot,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a job of `total` units.
    pub fn start(&mut self, total: usize) {
        self.started = Some(Instant::now());
        self.snapshot = ProgressSnapshot {
            total,
            ..ProgressSnapshot::default()
        };
    }

    /// Record that `current` of `total` units are done.
    pub fn update(&mut self, current: usize, total: usize) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.update_with_elapsed(current, total, elapsed);
    }

    fn update_with_elapsed(&mut self, current: usize, total: usize, elapsed: Duration) {
        let avg = if current == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() / current as f64
        };
        let eta = if total > current {
            (avg * (total - current) as f64).max(0.0)
        } else {
            0.0
        };
        trace!("progress {current}/{total} avg={avg:.3}s eta={eta:.1}s");
        self.snapshot = ProgressSnapshot {
            current,
            total,
            avg_seconds_per_unit: avg,
            eta_seconds: eta,
        };
    }

    /// Zero everything so a finished job never reports stale progress.
    pub fn reset(&mut self) {
        self.started = None;
        self.snapshot = ProgressSnapshot::default();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot
    }
}

/// Format a number of seconds as "X minutes Y seconds".
pub fn format_eta(secs: f64) -> String {
    let total_secs = secs.max(0.0).round() as u64;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!(
            "{} minute{} {} second{}",
            minutes,
            if minutes == 1 { "" } else { "s" },
            seconds,
            if seconds == 1 { "" } else { "s" }
        )
    } else {
        format!("{} second{}", seconds, if seconds == 1 { "" } else { "s" })
    }
}
