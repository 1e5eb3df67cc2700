use chrono::{DateTime, Utc};
use mesmer_routines::{RoutineId, VoiceType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task lifecycle states. Transitions only move forward; the store rejects
/// everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Payload of a completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub routine_id: RoutineId,
    pub output_filename: String,
    pub download_url: String,
    /// Present when the submission came from a regenerate action; points the
    /// client back at the routine it refreshed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// One tracked generation job. Snapshots of this struct are what `get`
/// returns; the live record sits behind a per-entry lock in the store.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Monotonic time the task entered `processing`; the reaper measures age
    /// from here. Not serialized.
    #[serde(skip)]
    pub processing_since: Option<Instant>,
}

/// Where a submission came from; decides whether the result carries a
/// redirect locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionOrigin {
    #[default]
    Direct,
    Regenerate,
}

/// A generation request as accepted by [`crate::TaskRunner::submit`].
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Routine name; also drives the output filename slug
    pub name: String,
    pub text: String,
    pub language: String,
    pub voice_type: VoiceType,
    /// Required for `VoiceType::Sample`
    pub voice_id: Option<String>,
    /// Required for `VoiceType::Upload`: a reference audio file already on
    /// disk (upload mechanics live outside the core)
    pub reference_path: Option<PathBuf>,
    /// Set when regenerating an existing routine
    pub routine_id: Option<RoutineId>,
    pub origin: SubmissionOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn result_omits_absent_redirect() {
        let result = TaskResult {
            routine_id: RoutineId::new(),
            output_filename: "calm.wav".to_string(),
            download_url: "/download/calm.wav".to_string(),
            redirect_url: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("redirect_url"));
    }
}
