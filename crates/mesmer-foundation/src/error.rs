use thiserror::Error;

#[derive(Error, Debug)]
pub enum MesmerError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Voice model error: {0}")]
    Model(#[from] ModelError),

    #[error("Routine storage error: {0}")]
    Routine(#[from] RoutineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

/// Errors surfaced by the task subsystem.
///
/// `Validation`, `ModelUnavailable` and `Busy` are synchronous rejections: no
/// task is created when they occur. `IllegalTransition` marks a programming
/// error in terminal-state handling and is never applied silently.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Voice model is not ready: {0}")]
    ModelUnavailable(String),

    #[error("Generation queue is full")]
    Busy,

    #[error("Unknown task: {0}")]
    NotFound(String),

    #[error("Illegal status transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: String,
        from: String,
        to: String,
    },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model download failed: {0}")]
    DownloadFailed(String),

    #[error("Model extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RoutineError {
    #[error("Unknown routine: {0}")]
    NotFound(String),

    #[error("Routine storage failed: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Validation { field: String, reason: String },
}
