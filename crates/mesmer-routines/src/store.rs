//! Routine persistence.
//!
//! The JSON-file store keeps the whole catalog in memory and rewrites the
//! file (temp + rename) on every mutation. Catalogs are small, tens of
//! routines, so the simplicity wins over an embedded database.

use crate::routine::{NewRoutine, Routine, RoutineId};
use async_trait::async_trait;
use chrono::Utc;
use mesmer_foundation::error::RoutineError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[async_trait]
pub trait RoutineStore: Send + Sync {
    async fn create(&self, new: NewRoutine) -> Result<Routine, RoutineError>;
    async fn get(&self, id: RoutineId) -> Result<Routine, RoutineError>;
    /// Point the routine at a fresh artifact. The previous reference is
    /// overwritten; failing generations never reach this method.
    async fn update_output(
        &self,
        id: RoutineId,
        output_filename: &str,
    ) -> Result<Routine, RoutineError>;
    /// All routines, ordered by creation time (stable across calls).
    async fn list(&self) -> Result<Vec<Routine>, RoutineError>;
    /// Remove the routine and, best-effort, its artifact. In-flight tasks
    /// referencing the id are not touched.
    async fn delete(&self, id: RoutineId) -> Result<(), RoutineError>;
}

pub struct JsonRoutineStore {
    path: PathBuf,
    output_dir: PathBuf,
    routines: Mutex<BTreeMap<RoutineId, Routine>>,
}

impl JsonRoutineStore {
    /// Open the catalog at `path`, artifacts living under `output_dir`.
    /// A missing file is an empty catalog; an unreadable one is logged and
    /// treated as empty rather than refusing to start.
    pub fn open(path: PathBuf, output_dir: PathBuf) -> Self {
        let routines = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<RoutineId, Routine>>(&bytes) {
                Ok(map) => {
                    debug!(count = map.len(), "Loaded routine catalog");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), "Routine catalog unreadable, starting empty: {}", e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            output_dir,
            routines: Mutex::new(routines),
        }
    }

    fn persist(&self, routines: &BTreeMap<RoutineId, Routine>) -> Result<(), RoutineError> {
        let json = serde_json::to_vec_pretty(routines)
            .map_err(|e| RoutineError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| RoutineError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RoutineError::Storage(e.to_string()))?;
        Ok(())
    }

    fn remove_artifact(&self, filename: &str) {
        // Artifact names are slugs/uuids produced by us; anything with a path
        // separator is not ours to delete.
        if filename.contains('/') || filename.contains('\\') {
            warn!(filename, "Refusing to delete suspicious artifact name");
            return;
        }
        let path = self.output_dir.join(filename);
        if path.is_file() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), "Could not delete artifact: {}", e);
            }
        }
    }
}

#[async_trait]
impl RoutineStore for JsonRoutineStore {
    async fn create(&self, new: NewRoutine) -> Result<Routine, RoutineError> {
        let now = Utc::now();
        let routine = Routine {
            id: RoutineId::new(),
            name: new.name,
            text: new.text,
            language: new.language,
            voice_type: new.voice_type,
            voice_id: new.voice_id,
            output_filename: new.output_filename,
            created_at: now,
            updated_at: now,
        };

        let mut routines = self.routines.lock();
        routines.insert(routine.id, routine.clone());
        self.persist(&routines)?;
        debug!(id = %routine.id, name = %routine.name, "Routine created");
        Ok(routine)
    }

    async fn get(&self, id: RoutineId) -> Result<Routine, RoutineError> {
        self.routines
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| RoutineError::NotFound(id.to_string()))
    }

    async fn update_output(
        &self,
        id: RoutineId,
        output_filename: &str,
    ) -> Result<Routine, RoutineError> {
        let mut routines = self.routines.lock();
        let routine = routines
            .get_mut(&id)
            .ok_or_else(|| RoutineError::NotFound(id.to_string()))?;
        routine.output_filename = Some(output_filename.to_string());
        routine.updated_at = Utc::now();
        let updated = routine.clone();
        self.persist(&routines)?;
        debug!(id = %id, output_filename, "Routine output updated");
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Routine>, RoutineError> {
        let mut all: Vec<Routine> = self.routines.lock().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn delete(&self, id: RoutineId) -> Result<(), RoutineError> {
        let mut routines = self.routines.lock();
        let routine = routines
            .remove(&id)
            .ok_or_else(|| RoutineError::NotFound(id.to_string()))?;
        self.persist(&routines)?;
        drop(routines);

        if let Some(filename) = &routine.output_filename {
            self.remove_artifact(filename);
        }
        debug!(id = %id, "Routine deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::VoiceType;

    fn new_routine(name: &str) -> NewRoutine {
        NewRoutine {
            name: name.to_string(),
            text: "Relax.".to_string(),
            language: "en".to_string(),
            voice_type: VoiceType::Sample,
            voice_id: Some("male1".to_string()),
            output_filename: None,
        }
    }

    fn store_in(dir: &std::path::Path) -> JsonRoutineStore {
        JsonRoutineStore::open(dir.join("routines.json"), dir.join("output"))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let created = store.create(new_routine("Evening wind-down")).await.unwrap();
        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.name, "Evening wind-down");
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let err = store.get(RoutineId::new()).await.unwrap_err();
        assert!(matches!(err, RoutineError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_orders_by_creation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let a = store.create(new_routine("a")).await.unwrap();
        let b = store.create(new_routine("b")).await.unwrap();
        let c = store.create(new_routine("c")).await.unwrap();

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn update_output_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let routine = store.create(new_routine("loop")).await.unwrap();
        store.update_output(routine.id, "a.wav").await.unwrap();
        let updated = store.update_output(routine.id, "b.wav").await.unwrap();

        assert_eq!(updated.output_filename.as_deref(), Some("b.wav"));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(updated.created_at, routine.created_at);
    }

    #[tokio::test]
    async fn update_output_unknown_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let err = store
            .update_output(RoutineId::new(), "a.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, RoutineError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_record_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("output");
        std::fs::create_dir_all(&output_dir).unwrap();
        let store = store_in(dir.path());

        let routine = store.create(new_routine("gone soon")).await.unwrap();
        std::fs::write(output_dir.join("gone-soon.wav"), b"wav").unwrap();
        store
            .update_output(routine.id, "gone-soon.wav")
            .await
            .unwrap();

        store.delete(routine.id).await.unwrap();
        assert!(matches!(
            store.get(routine.id).await.unwrap_err(),
            RoutineError::NotFound(_)
        ));
        assert!(!output_dir.join("gone-soon.wav").exists());

        // Second delete reports NotFound rather than succeeding silently
        assert!(matches!(
            store.delete(routine.id).await.unwrap_err(),
            RoutineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn catalog_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = store_in(dir.path());
            store.create(new_routine("persistent")).await.unwrap().id
        };

        let reopened = store_in(dir.path());
        let fetched = reopened.get(id).await.unwrap();
        assert_eq!(fetched.name, "persistent");
    }

    #[tokio::test]
    async fn corrupt_catalog_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("routines.json"), b"{not json").unwrap();
        let store = store_in(dir.path());
        assert!(store.list().await.unwrap().is_empty());
    }
}
