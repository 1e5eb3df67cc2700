use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counters for cross-thread task monitoring.
///
/// Cloned freely; all clones observe the same cells. The runner is the only
/// writer, the health endpoint the usual reader.
#[derive(Clone, Default)]
pub struct TaskMetrics {
    pub submitted: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    // Synchronous rejections, split by cause
    pub rejected_validation: Arc<AtomicU64>,
    pub rejected_model: Arc<AtomicU64>,
    pub rejected_busy: Arc<AtomicU64>,
    // Jobs currently executing
    pub active: Arc<AtomicUsize>,
    // Duration of the most recent finished generation, in ms
    pub last_generation_ms: Arc<AtomicU64>,
    // Most recent failure message, for the health surface
    pub last_error: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected_validation: u64,
    pub rejected_model: u64,
    pub rejected_busy: u64,
    pub active: usize,
    pub last_generation_ms: u64,
    pub last_error: Option<String>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, duration_ms: u64) {
        self.dec_active();
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.last_generation_ms.store(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failed(&self, error: &str) {
        self.dec_active();
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(error.to_string());
    }

    // The panic path cannot know whether the job incremented the gauge, so
    // decrements saturate instead of wrapping.
    fn dec_active(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// A task flipped to failed without the runner observing it finish (the
    /// reaper path). Does not touch the active gauge.
    pub fn record_reaped(&self, error: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(error.to_string());
    }

    pub fn record_rejected_validation(&self) {
        self.rejected_validation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_model(&self) {
        self.rejected_model.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_busy(&self) {
        self.rejected_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskMetricsSnapshot {
        TaskMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected_validation: self.rejected_validation.load(Ordering::Relaxed),
            rejected_model: self.rejected_model.load(Ordering::Relaxed),
            rejected_busy: self.rejected_busy.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            last_generation_ms: self.last_generation_ms.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_move_through_a_job_lifecycle() {
        let metrics = TaskMetrics::new();
        metrics.record_submitted();
        metrics.record_started();
        assert_eq!(metrics.snapshot().active, 1);

        metrics.record_completed(1234);
        let snap = metrics.snapshot();
        assert_eq!(snap.submitted, 1);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.active, 0);
        assert_eq!(snap.last_generation_ms, 1234);
    }

    #[test]
    fn failure_records_last_error() {
        let metrics = TaskMetrics::new();
        metrics.record_started();
        metrics.record_failed("synthesis exploded");
        let snap = metrics.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.last_error.as_deref(), Some("synthesis exploded"));
    }

    #[test]
    fn clones_share_cells() {
        let metrics = TaskMetrics::new();
        let clone = metrics.clone();
        clone.record_submitted();
        assert_eq!(metrics.snapshot().submitted, 1);
    }
}
