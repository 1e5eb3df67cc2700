//! Task registry.
//!
//! Process-wide map from task id to task record. Entries are created
//! `pending`, advanced through the `set_*` methods only, and never removed
//! for the lifetime of the process (restart clears the registry by design).
//! Each record sits behind its own lock; the outer map lock is held only for
//! lookup and insert, so slow tasks never serialize unrelated ones.

use crate::task::{Task, TaskId, TaskResult, TaskStatus};
use chrono::Utc;
use mesmer_foundation::clock::SharedClock;
use mesmer_foundation::error::TaskError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Arc<RwLock<Task>>>>,
    clock: SharedClock,
}

impl TaskStore {
    pub fn new(clock: SharedClock) -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            clock,
        })
    }

    /// Allocate a fresh id and insert a `pending` entry for it.
    pub fn create(&self) -> TaskId {
        let mut tasks = self.tasks.write();
        loop {
            let id = TaskId::new();
            if tasks.contains_key(&id) {
                continue;
            }
            let task = Task {
                id,
                status: TaskStatus::Pending,
                result: None,
                error: None,
                created_at: Utc::now(),
                processing_since: None,
            };
            tasks.insert(id, Arc::new(RwLock::new(task)));
            debug!(task_id = %id, "Task created");
            return id;
        }
    }

    /// Snapshot of the current record. Concurrent writers are invisible: the
    /// clone happens under the entry lock, so callers see the record before
    /// or after a transition, never mid-write.
    pub fn get(&self, id: TaskId) -> Result<Task, TaskError> {
        let entry = self.entry(id)?;
        let task = entry.read();
        Ok(task.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    pub fn set_processing(&self, id: TaskId) -> Result<(), TaskError> {
        let now = self.clock.now();
        self.advance(id, TaskStatus::Processing, |task| {
            task.processing_since = Some(now);
        })
    }

    pub fn set_completed(&self, id: TaskId, result: TaskResult) -> Result<(), TaskError> {
        self.advance(id, TaskStatus::Completed, move |task| {
            task.result = Some(result);
        })
    }

    pub fn set_failed(&self, id: TaskId, error: impl Into<String>) -> Result<(), TaskError> {
        let error = error.into();
        self.advance(id, TaskStatus::Failed, move |task| {
            task.error = Some(error);
        })
    }

    /// Ids of tasks that have been `processing` for longer than `age`,
    /// measured on the store's clock. Used by the reaper.
    pub fn processing_older_than(&self, age: Duration) -> Vec<TaskId> {
        let now = self.clock.now();
        let tasks = self.tasks.read();
        tasks
            .values()
            .filter_map(|entry| {
                let task = entry.read();
                match (task.status, task.processing_since) {
                    (TaskStatus::Processing, Some(since))
                        if now.duration_since(since) > age =>
                    {
                        Some(task.id)
                    }
                    _ => None,
                }
            })
            .collect()
    }

    fn entry(&self, id: TaskId) -> Result<Arc<RwLock<Task>>, TaskError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    /// The single place transitions happen. The legality check and the
    /// mutation run under the entry's write lock, which is what makes
    /// "exactly one terminal write" enforceable: a second terminal attempt
    /// sees the terminal status and is rejected.
    fn advance(
        &self,
        id: TaskId,
        to: TaskStatus,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<(), TaskError> {
        let entry = self.entry(id)?;
        let mut task = entry.write();

        let legal = matches!(
            (task.status, to),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        );
        if !legal {
            warn!(task_id = %id, from = %task.status, to = %to, "Illegal task transition rejected");
            return Err(TaskError::IllegalTransition {
                task_id: id.to_string(),
                from: task.status.to_string(),
                to: to.to_string(),
            });
        }

        task.status = to;
        mutate(&mut task);
        debug!(task_id = %id, status = %to, "Task transition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesmer_foundation::clock::{system_clock, ManualClock};
    use mesmer_routines::RoutineId;

    fn result() -> TaskResult {
        TaskResult {
            routine_id: RoutineId::new(),
            output_filename: "calm.wav".to_string(),
            download_url: "/download/calm.wav".to_string(),
            redirect_url: None,
        }
    }

    #[test]
    fn created_task_is_pending_and_retrievable() {
        let store = TaskStore::new(system_clock());
        let id = store.create();
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = TaskStore::new(system_clock());
        assert!(matches!(
            store.get(TaskId::new()),
            Err(TaskError::NotFound(_))
        ));
    }

    #[test]
    fn happy_path_transitions() {
        let store = TaskStore::new(system_clock());
        let id = store.create();
        store.set_processing(id).unwrap();
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Processing);
        store.set_completed(id, result()).unwrap();
        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.result.is_some());
    }

    #[test]
    fn skipping_processing_is_illegal() {
        let store = TaskStore::new(system_clock());
        let id = store.create();
        assert!(matches!(
            store.set_completed(id, result()),
            Err(TaskError::IllegalTransition { .. })
        ));
        assert!(matches!(
            store.set_failed(id, "boom"),
            Err(TaskError::IllegalTransition { .. })
        ));
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn terminal_states_cannot_be_overwritten() {
        let store = TaskStore::new(system_clock());
        let id = store.create();
        store.set_processing(id).unwrap();
        store.set_failed(id, "first failure").unwrap();

        assert!(matches!(
            store.set_completed(id, result()),
            Err(TaskError::IllegalTransition { .. })
        ));
        assert!(matches!(
            store.set_failed(id, "second failure"),
            Err(TaskError::IllegalTransition { .. })
        ));

        let task = store.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("first failure"));
    }

    #[test]
    fn status_never_regresses_to_processing() {
        let store = TaskStore::new(system_clock());
        let id = store.create();
        store.set_processing(id).unwrap();
        store.set_completed(id, result()).unwrap();
        assert!(matches!(
            store.set_processing(id),
            Err(TaskError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn processing_age_is_measured_on_the_store_clock() {
        let clock = Arc::new(ManualClock::new());
        let store = TaskStore::new(clock.clone());

        let stuck = store.create();
        store.set_processing(stuck).unwrap();
        let fresh = store.create();

        clock.advance(Duration::from_secs(100));
        store.set_processing(fresh).unwrap();
        clock.advance(Duration::from_secs(50));

        let over_two_minutes = store.processing_older_than(Duration::from_secs(120));
        assert_eq!(over_two_minutes, vec![stuck]);

        let over_ten_seconds = store.processing_older_than(Duration::from_secs(10));
        assert_eq!(over_ten_seconds.len(), 2);
    }
}
