//! Task runner: validation, queueing and background execution.
//!
//! `submit` is the synchronous edge: everything it rejects never becomes a
//! task. Accepted jobs flow through an mpsc queue into the dispatcher, which
//! fans them out to semaphore-bounded worker tasks. Workers own the terminal
//! transition: whatever happens inside a job (engine error, timeout, panic,
//! vanished routine), exactly one of `set_completed`/`set_failed` lands.

use crate::store::TaskStore;
use crate::task::{SubmissionOrigin, SubmissionRequest, TaskId, TaskResult, TaskStatus};
use mesmer_foundation::error::{RoutineError, TaskError};
use mesmer_model::ModelGate;
use mesmer_routines::{slugify, NewRoutine, RoutineStore, VoiceType};
use mesmer_telemetry::TaskMetrics;
use mesmer_tts::{SynthesisRequest, TtsEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything the runner needs to know that is not a collaborator.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Accepted language codes
    pub languages: BTreeSet<String>,
    /// Sample voice id -> reference audio path
    pub sample_voices: BTreeMap<String, PathBuf>,
    /// Where uploaded references live; temp files here are cleaned up
    pub voices_dir: PathBuf,
    /// Where generated artifacts land
    pub output_dir: PathBuf,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
}

/// A validated job as it travels from `submit` to a worker.
#[derive(Debug)]
struct GenerationJob {
    task_id: TaskId,
    request: SubmissionRequest,
    voice_path: PathBuf,
}

/// Shared context for the dispatcher and its workers.
struct JobContext {
    store: Arc<TaskStore>,
    routines: Arc<dyn RoutineStore>,
    engine: Arc<dyn TtsEngine>,
    metrics: TaskMetrics,
    options: RunnerOptions,
}

pub struct TaskRunner {
    ctx: Arc<JobContext>,
    gate: Arc<ModelGate>,
    job_tx: mpsc::Sender<GenerationJob>,
}

impl TaskRunner {
    /// Build the runner and spawn its dispatcher. The returned handle is the
    /// dispatcher task; aborting it stops intake, already-running jobs finish.
    pub fn spawn(
        store: Arc<TaskStore>,
        routines: Arc<dyn RoutineStore>,
        engine: Arc<dyn TtsEngine>,
        gate: Arc<ModelGate>,
        metrics: TaskMetrics,
        options: RunnerOptions,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (job_tx, job_rx) = mpsc::channel(options.queue_capacity);
        let ctx = Arc::new(JobContext {
            store,
            routines,
            engine,
            metrics,
            options,
        });
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&ctx), job_rx));
        let runner = Arc::new(Self { ctx, gate, job_tx });
        (runner, dispatcher)
    }

    /// Accept or reject a generation request.
    ///
    /// Rejections (validation, model gate, full queue) happen before a task
    /// id exists, so callers never have to poll a request that was refused.
    pub fn submit(&self, request: SubmissionRequest) -> Result<TaskId, TaskError> {
        let gate_status = self.gate.status();
        if gate_status.status != mesmer_model::ModelStatus::Downloaded {
            self.ctx.metrics.record_rejected_model();
            return Err(TaskError::ModelUnavailable(format!(
                "voice model is {}; download it before generating",
                gate_status.status
            )));
        }

        let voice_path = self.validate(&request).inspect_err(|_| {
            self.ctx.metrics.record_rejected_validation();
        })?;

        // Reserve queue capacity first: a full queue must not leave an
        // orphaned pending entry behind.
        let permit = self.job_tx.try_reserve().map_err(|_| {
            self.ctx.metrics.record_rejected_busy();
            TaskError::Busy
        })?;

        let task_id = self.ctx.store.create();
        self.ctx.metrics.record_submitted();
        info!(task_id = %task_id, name = %request.name, "Generation task accepted");
        permit.send(GenerationJob {
            task_id,
            request,
            voice_path,
        });
        Ok(task_id)
    }

    fn validate(&self, request: &SubmissionRequest) -> Result<PathBuf, TaskError> {
        if request.text.trim().is_empty() {
            return Err(TaskError::Validation("text is required".to_string()));
        }
        if request.name.trim().is_empty() {
            return Err(TaskError::Validation("routine name is required".to_string()));
        }
        if !self.ctx.options.languages.contains(&request.language) {
            return Err(TaskError::Validation(format!(
                "unsupported language: {}",
                request.language
            )));
        }

        match request.voice_type {
            VoiceType::Sample => {
                let voice_id = request.voice_id.as_deref().ok_or_else(|| {
                    TaskError::Validation("no sample voice selected".to_string())
                })?;
                self.ctx
                    .options
                    .sample_voices
                    .get(voice_id)
                    .cloned()
                    .ok_or_else(|| {
                        TaskError::Validation(format!("unknown sample voice: {voice_id}"))
                    })
            }
            VoiceType::Upload => {
                let path = request.reference_path.as_ref().ok_or_else(|| {
                    TaskError::Validation("no voice reference uploaded".to_string())
                })?;
                if !path.is_file() {
                    return Err(TaskError::Validation(format!(
                        "voice reference {} does not exist",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
        }
    }
}

/// Pulls jobs off the queue and spawns one worker per job, at most
/// `max_concurrent` at a time. The worker is spawned as a separate task and
/// awaited through its JoinHandle so that a panicking engine still produces a
/// failed task instead of a forever-`processing` one.
async fn dispatch(ctx: Arc<JobContext>, mut job_rx: mpsc::Receiver<GenerationJob>) {
    let semaphore = Arc::new(Semaphore::new(ctx.options.max_concurrent));
    info!(
        workers = ctx.options.max_concurrent,
        "Generation dispatcher started"
    );

    while let Some(job) = job_rx.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let task_id = job.task_id;
            let inner = tokio::spawn(execute_job(Arc::clone(&ctx), job));
            if let Err(join_err) = inner.await {
                error!(task_id = %task_id, "Generation worker died: {}", join_err);
                fail_from_any_live_state(
                    &ctx,
                    task_id,
                    "generation worker terminated unexpectedly",
                );
                ctx.metrics.record_failed("generation worker terminated unexpectedly");
            }
            drop(permit);
        });
    }

    info!("Generation dispatcher stopped");
}

async fn execute_job(ctx: Arc<JobContext>, job: GenerationJob) {
    let task_id = job.task_id;
    let started = Instant::now();

    if let Err(e) = ctx.store.set_processing(task_id) {
        // Only possible if something else already finished this task (e.g.
        // the reaper during a long queue wait). Nothing left to do.
        warn!(task_id = %task_id, "Could not start task: {}", e);
        return;
    }
    ctx.metrics.record_started();

    match run_generation(&ctx, &job).await {
        Ok(result) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match ctx.store.set_completed(task_id, result) {
                Ok(()) => {
                    info!(task_id = %task_id, elapsed_ms, "Generation completed");
                    ctx.metrics.record_completed(elapsed_ms);
                }
                Err(e) => {
                    // Lost the race against the reaper; the artifact exists
                    // but the task already failed. Keep the gauge honest.
                    warn!(task_id = %task_id, "Completion discarded: {}", e);
                    ctx.metrics.record_completed(elapsed_ms);
                }
            }
        }
        Err(message) => {
            warn!(task_id = %task_id, "Generation failed: {}", message);
            if let Err(e) = ctx.store.set_failed(task_id, message.clone()) {
                warn!(task_id = %task_id, "Failure already recorded: {}", e);
            }
            ctx.metrics.record_failed(&message);
        }
    }

    cleanup_temp_reference(&ctx, &job);
}

/// The generation itself, isolated so every failure mode collapses into a
/// message for `set_failed`. No routine mutation happens on any error path.
async fn run_generation(ctx: &Arc<JobContext>, job: &GenerationJob) -> Result<TaskResult, String> {
    let filename = output_filename(&job.request.name);
    let final_path = ctx.options.output_dir.join(&filename);
    // Synthesize to a scratch name: a failed regeneration must leave the
    // routine's previous artifact untouched on disk.
    let scratch_path = ctx
        .options
        .output_dir
        .join(format!(".partial-{}-{}", job.task_id, filename));

    let synthesis = SynthesisRequest {
        text: job.request.text.clone(),
        language: job.request.language.clone(),
        voice_reference: job.voice_path.clone(),
    };

    let outcome = tokio::time::timeout(
        ctx.options.job_timeout,
        ctx.engine.synthesize(&synthesis, &scratch_path),
    )
    .await;

    let output = match outcome {
        Err(_) => {
            let _ = tokio::fs::remove_file(&scratch_path).await;
            return Err(format!(
                "generation timed out after {} seconds",
                ctx.options.job_timeout.as_secs()
            ));
        }
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&scratch_path).await;
            return Err(e.to_string());
        }
        Ok(Ok(output)) => output,
    };
    debug!(task_id = %job.task_id, bytes = output.bytes, "Artifact synthesized");

    let routine = match job.request.routine_id {
        Some(routine_id) => match ctx.routines.update_output(routine_id, &filename).await {
            Ok(routine) => routine,
            Err(RoutineError::NotFound(_)) => {
                // The routine was deleted while we were generating. Deletion
                // wins: drop the audio and fail the task instead of
                // resurrecting the record.
                let _ = tokio::fs::remove_file(&scratch_path).await;
                return Err(format!(
                    "routine {routine_id} no longer exists; generated audio was discarded"
                ));
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&scratch_path).await;
                return Err(e.to_string());
            }
        },
        None => {
            let new = NewRoutine {
                name: job.request.name.clone(),
                text: job.request.text.clone(),
                language: job.request.language.clone(),
                voice_type: job.request.voice_type,
                voice_id: job.request.voice_id.clone(),
                output_filename: Some(filename.clone()),
            };
            ctx.routines
                .create(new)
                .await
                .map_err(|e| e.to_string())?
        }
    };

    tokio::fs::rename(&scratch_path, &final_path)
        .await
        .map_err(|e| format!("could not move artifact into place: {e}"))?;

    Ok(TaskResult {
        routine_id: routine.id,
        output_filename: filename.clone(),
        download_url: format!("/download/{filename}"),
        redirect_url: match job.request.origin {
            SubmissionOrigin::Regenerate => Some(format!("/routines/{}", routine.id)),
            SubmissionOrigin::Direct => None,
        },
    })
}

/// Slug of the routine name, falling back to a UUID for names that slug to
/// nothing. Regenerations of the same routine reuse the same filename, so the
/// artifact is replaced rather than accumulated.
fn output_filename(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        format!("{}.wav", Uuid::new_v4())
    } else {
        format!("{slug}.wav")
    }
}

/// Uploaded references are one-shot: files we recognize as ours (inside the
/// voices dir, `temp_` prefix) are removed after the job, success or failure.
fn cleanup_temp_reference(ctx: &Arc<JobContext>, job: &GenerationJob) {
    if job.request.voice_type != VoiceType::Upload {
        return;
    }
    let path = &job.voice_path;
    let is_temp = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("temp_"));
    if is_temp && path.starts_with(&ctx.options.voices_dir) && path.is_file() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), "Could not remove temp reference: {}", e);
        } else {
            debug!(path = %path.display(), "Temp reference removed");
        }
    }
}

/// Force a task to `failed` from whatever non-terminal state it is in.
/// Used on the panic path, where the job may not have reached `processing`.
fn fail_from_any_live_state(ctx: &Arc<JobContext>, task_id: TaskId, message: &str) {
    if let Ok(task) = ctx.store.get(task_id) {
        if task.status == TaskStatus::Pending {
            let _ = ctx.store.set_processing(task_id);
        }
    }
    if let Err(e) = ctx.store.set_failed(task_id, message) {
        warn!(task_id = %task_id, "Could not record worker failure: {}", e);
    }
}
