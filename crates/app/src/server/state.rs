//! Shared state across all handlers.

use std::sync::Arc;

use mesmer_foundation::config::MesmerConfig;
use mesmer_model::ModelGate;
use mesmer_routines::RoutineStore;
use mesmer_tasks::{TaskRunner, TaskStore};
use mesmer_telemetry::TaskMetrics;

use crate::runtime::AppHandle;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<MesmerConfig>,
    pub store: Arc<TaskStore>,
    pub routines: Arc<dyn RoutineStore>,
    pub runner: Arc<TaskRunner>,
    pub gate: Arc<ModelGate>,
    pub metrics: TaskMetrics,
}

impl ServerState {
    pub fn from_handle(handle: &AppHandle) -> Self {
        Self {
            config: Arc::clone(&handle.config),
            store: Arc::clone(&handle.store),
            routines: Arc::clone(&handle.routines),
            runner: Arc::clone(&handle.runner),
            gate: Arc::clone(&handle.gate),
            metrics: handle.metrics.clone(),
        }
    }
}
