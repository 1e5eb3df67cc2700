//! Stuck-task reaper.
//!
//! Backstop for tasks that lost their worker: anything sitting in
//! `processing` past the age bound is flipped to `failed` through the store's
//! guarded transition. A job that finishes at the same moment simply wins or
//! loses that race; either way the task gets exactly one terminal state.

use crate::store::TaskStore;
use crate::task::TaskId;
use mesmer_telemetry::TaskMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub interval: Duration,
    /// How long a task may stay in `processing` before it is declared lost.
    pub stuck_after: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stuck_after: Duration::from_secs(1800),
        }
    }
}

pub fn spawn_reaper(
    store: Arc<TaskStore>,
    metrics: TaskMetrics,
    config: ReaperConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = config.interval.as_secs(),
            stuck_after_secs = config.stuck_after.as_secs(),
            "Task reaper started"
        );
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so a fresh start
        // never reaps before a full interval has passed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reap_once(&store, &metrics, config.stuck_after);
        }
    })
}

/// One sweep. Returns the ids actually reaped, for tests and logging.
pub fn reap_once(
    store: &Arc<TaskStore>,
    metrics: &TaskMetrics,
    stuck_after: Duration,
) -> Vec<TaskId> {
    let mut reaped = Vec::new();
    for id in store.processing_older_than(stuck_after) {
        let message = format!(
            "task exceeded the {} second processing bound and was abandoned",
            stuck_after.as_secs()
        );
        match store.set_failed(id, message.clone()) {
            Ok(()) => {
                warn!(task_id = %id, "Reaped stuck task");
                metrics.record_reaped(&message);
                reaped.push(id);
            }
            // The worker finished between the scan and this write.
            Err(e) => debug!(task_id = %id, "Skipping reap: {}", e),
        }
    }
    reaped
}
