//! Statistics (spec §4.12, component C12).
//!
//! Plain atomics, no locks — every counter is independently monotonic
//! within a run and reset together by `reset()` when the scheduler starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

pub struct Stats {
    started_at: std::sync::Mutex<Option<Instant>>,
    posted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    fanout_success: AtomicU64,
    fanout_failure: AtomicU64,
    total_completion_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub runtime_secs: u64,
    pub posted: u64,
    pub completed: u64,
    pub failed: u64,
    pub fanout_success: u64,
    pub fanout_failure: u64,
    pub success_rate: f64,
    pub avg_completion_millis: f64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: std::sync::Mutex::new(Some(Instant::now())),
            posted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            fanout_success: AtomicU64::new(0),
            fanout_failure: AtomicU64::new(0),
            total_completion_millis: AtomicU64::new(0),
        }
    }

    pub fn reset(&self) {
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.posted.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.fanout_success.store(0, Ordering::SeqCst);
        self.fanout_failure.store(0, Ordering::SeqCst);
        self.total_completion_millis.store(0, Ordering::SeqCst);
    }

    pub fn record_posted(&self) {
        self.posted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_completed(&self, completion_millis: u64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.total_completion_millis.fetch_add(completion_millis, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_fanout(&self, success: bool) {
        if success {
            self.fanout_success.fetch_add(1, Ordering::SeqCst);
        } else {
            self.fanout_failure.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn runtime(&self) -> u64 {
        self.started_at
            .lock()
            .unwrap()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn success_rate(&self) -> f64 {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total = completed + failed;
        if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let completed = self.completed.load(Ordering::SeqCst);
        let avg_completion_millis = if completed == 0 {
            0.0
        } else {
            self.total_completion_millis.load(Ordering::SeqCst) as f64 / completed as f64
        };
        StatsSnapshot {
            runtime_secs: self.runtime(),
            posted: self.posted.load(Ordering::SeqCst),
            completed,
            failed: self.failed.load(Ordering::SeqCst),
            fanout_success: self.fanout_success.load(Ordering::SeqCst),
            fanout_failure: self.fanout_failure.load(Ordering::SeqCst),
            success_rate: self.success_rate(),
            avg_completion_millis,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
