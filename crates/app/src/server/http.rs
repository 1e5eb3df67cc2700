//! HTTP Endpoints
//!
//! JSON API over the task, model and routine subsystems. Transport concerns
//! only; every behavior here is a thin echo of a core contract.

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mesmer_foundation::config::is_within_dir;
use mesmer_foundation::error::{RoutineError, TaskError};
use mesmer_routines::{RoutineId, VoiceType};
use mesmer_tasks::{SubmissionOrigin, SubmissionRequest, TaskId};
use mesmer_tts::VoiceInfo;

use crate::server::state::ServerState;

/// Create the application router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        // Generation + polling
        .route("/api/generate", post(submit_generation))
        .route("/api/tasks/{id}", get(get_task_status))
        // Voice model gate
        .route("/api/model/status", get(model_status))
        .route("/api/model/download", post(start_model_download))
        // Routine catalog
        .route("/api/routines", get(list_routines))
        .route("/api/routines/{id}", get(get_routine))
        .route("/api/routines/{id}", delete(delete_routine))
        .route("/api/routines/{id}/regenerate", post(regenerate_routine))
        // Catalog metadata
        .route("/api/voices", get(list_voices))
        .route("/api/languages", get(list_languages))
        // Artifacts
        .route("/download/{filename}", get(download_artifact))
        // Health check
        .route("/health", get(health_check))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Error envelope: every non-2xx body is `{"error": "..."}`.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match &err {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TaskError::Busy => StatusCode::TOO_MANY_REQUESTS,
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::IllegalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<RoutineError> for ApiError {
    fn from(err: RoutineError) -> Self {
        let status = match &err {
            RoutineError::NotFound(_) => StatusCode::NOT_FOUND,
            RoutineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_voice_type() -> VoiceType {
    VoiceType::Sample
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    name: String,
    text: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default = "default_voice_type")]
    voice_type: VoiceType,
    #[serde(default)]
    voice_id: Option<String>,
    /// Reference audio already on disk (upload mechanics live outside the
    /// core; see the docs for the upload companion endpoint).
    #[serde(default)]
    reference_path: Option<std::path::PathBuf>,
    #[serde(default)]
    routine_id: Option<RoutineId>,
}

async fn submit_generation(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = state.runner.submit(SubmissionRequest {
        name: request.name,
        text: request.text,
        language: request.language,
        voice_type: request.voice_type,
        voice_id: request.voice_id,
        reference_path: request.reference_path,
        routine_id: request.routine_id,
        origin: SubmissionOrigin::Direct,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "task_id": task_id })),
    ))
}

async fn get_task_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id: TaskId = id
        .parse()
        .map_err(|_| ApiError::not_found(format!("Unknown task: {id}")))?;
    let task = state.store.get(task_id)?;
    Ok(Json(task))
}

async fn model_status(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.gate.status())
}

async fn start_model_download(State(state): State<ServerState>) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(state.gate.start_download()))
}

async fn list_routines(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, ApiError> {
    let routines = state.routines.list().await?;
    Ok(Json(routines))
}

async fn get_routine(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let routine_id = parse_routine_id(&id)?;
    let routine = state.routines.get(routine_id).await?;
    Ok(Json(routine))
}

async fn delete_routine(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let routine_id = parse_routine_id(&id)?;
    state.routines.delete(routine_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-run a stored routine's generation. Sample-voice routines only:
/// uploaded references are not retained, so those must go back through
/// `/api/generate` with a fresh reference.
async fn regenerate_routine(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let routine_id = parse_routine_id(&id)?;
    let routine = state.routines.get(routine_id).await?;

    if routine.voice_type == VoiceType::Upload {
        return Err(ApiError::from(TaskError::Validation(
            "uploaded voice references are not retained; submit a new generation with a fresh reference"
                .to_string(),
        )));
    }

    let task_id = state.runner.submit(SubmissionRequest {
        name: routine.name,
        text: routine.text,
        language: routine.language,
        voice_type: routine.voice_type,
        voice_id: routine.voice_id,
        reference_path: None,
        routine_id: Some(routine_id),
        origin: SubmissionOrigin::Regenerate,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "task_id": task_id })),
    ))
}

async fn list_voices(State(state): State<ServerState>) -> impl IntoResponse {
    let voices: Vec<VoiceInfo> = state
        .config
        .sample_voices
        .iter()
        .map(|(id, voice)| VoiceInfo {
            id: id.clone(),
            name: voice.name.clone(),
        })
        .collect();
    Json(voices)
}

async fn list_languages(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.config.languages.clone())
}

async fn download_artifact(
    State(state): State<ServerState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Artifact names are slugs or uuids; anything else is not ours.
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ApiError::not_found(format!("No such file: {filename}")));
    }

    let output_dir = state.config.output_dir();
    let path = output_dir.join(&filename);
    if !is_within_dir(&output_dir, &path) {
        return Err(ApiError::not_found(format!("No such file: {filename}")));
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("No such file: {filename}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

async fn health_check(State(state): State<ServerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.gate.status().status,
        "tasks": state.metrics.snapshot(),
    }))
}

fn parse_routine_id(id: &str) -> Result<RoutineId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::not_found(format!("Unknown routine: {id}")))
}
