//! Runtime wiring: builds the collaborators, starts the background tasks and
//! hands back a handle that owns them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use mesmer_foundation::clock::system_clock;
use mesmer_foundation::config::MesmerConfig;
use mesmer_foundation::error::MesmerError;
use mesmer_model::{HttpZipFetcher, ModelGate};
use mesmer_routines::{JsonRoutineStore, RoutineStore};
use mesmer_tasks::{spawn_reaper, ReaperConfig, RunnerOptions, TaskRunner, TaskStore};
use mesmer_telemetry::TaskMetrics;
use mesmer_tts::{TtsEngine, XttsProcessEngine};
use std::time::Duration;

/// Handle to the running service internals.
pub struct AppHandle {
    pub config: Arc<MesmerConfig>,
    pub store: Arc<TaskStore>,
    pub routines: Arc<dyn RoutineStore>,
    pub runner: Arc<TaskRunner>,
    pub gate: Arc<ModelGate>,
    pub metrics: TaskMetrics,
    dispatcher_handle: JoinHandle<()>,
    reaper_handle: JoinHandle<()>,
}

impl AppHandle {
    /// Stop intake and the reaper. Jobs already executing run to their
    /// terminal state on the runtime they were spawned on.
    pub fn shutdown(self) {
        info!("Shutting down Mesmer runtime...");
        self.dispatcher_handle.abort();
        self.reaper_handle.abort();
    }
}

/// Start the service with the production XTTS engine.
pub fn start(config: MesmerConfig) -> Result<AppHandle, MesmerError> {
    let engine = Arc::new(XttsProcessEngine::new(
        config.engine.command.clone(),
        config.engine.extra_args.clone(),
        config.model_dir(),
    ));
    start_with_engine(config, engine)
}

/// Start with an injected engine; the seam tests and embedders use.
pub fn start_with_engine(
    config: MesmerConfig,
    engine: Arc<dyn TtsEngine>,
) -> Result<AppHandle, MesmerError> {
    config.validate()?;
    config.ensure_dirs()?;

    let gate = ModelGate::new(
        config.model_dir(),
        Arc::new(HttpZipFetcher::new(config.model.archive_url.clone())),
    );
    info!(status = %gate.status().status, "Voice model gate seeded");

    let store = TaskStore::new(system_clock());
    let routines: Arc<dyn RoutineStore> = Arc::new(JsonRoutineStore::open(
        config.routines_file(),
        config.output_dir(),
    ));
    let metrics = TaskMetrics::new();

    let options = RunnerOptions {
        languages: config.languages.keys().cloned().collect(),
        sample_voices: config
            .sample_voices
            .keys()
            .filter_map(|id| config.sample_voice_path(id).map(|p| (id.clone(), p)))
            .collect(),
        voices_dir: config.voices_dir(),
        output_dir: config.output_dir(),
        max_concurrent: config.tasks.max_concurrent,
        queue_capacity: config.tasks.queue_capacity,
        job_timeout: Duration::from_secs(config.tasks.job_timeout_secs),
    };

    let (runner, dispatcher_handle) = TaskRunner::spawn(
        Arc::clone(&store),
        Arc::clone(&routines),
        engine,
        Arc::clone(&gate),
        metrics.clone(),
        options,
    );

    let reaper_handle = spawn_reaper(
        Arc::clone(&store),
        metrics.clone(),
        ReaperConfig {
            interval: Duration::from_secs(config.tasks.reaper_interval_secs),
            stuck_after: Duration::from_secs(config.tasks.stuck_after_secs),
        },
    );

    Ok(AppHandle {
        config: Arc::new(config),
        store,
        routines,
        runner,
        gate,
        metrics,
        dispatcher_handle,
        reaper_handle,
    })
}
