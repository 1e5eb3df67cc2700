//! Service configuration.
//!
//! Settings come from `mesmer.toml` (optional) overlaid with `MESMER_*`
//! environment variables. Everything has a usable default so the service can
//! start from an empty directory.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MesmerConfig {
    /// Root directory for everything Mesmer persists: the voice model, the
    /// routine catalog, generated audio and uploaded references.
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub tasks: TaskConfig,
    pub engine: EngineConfig,
    /// Language code -> display name. Submissions must use one of these codes.
    pub languages: BTreeMap<String, String>,
    /// Bundled reference voices, keyed by voice id.
    pub sample_voices: BTreeMap<String, SampleVoice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Archive the voice model is fetched from. Empty means downloads are
    /// disabled and the model must be provisioned into `model_dir` manually.
    pub archive_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub job_timeout_secs: u64,
    pub reaper_interval_secs: u64,
    /// Age after which a task still in `processing` is declared failed.
    pub stuck_after_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Synthesis command invoked per job.
    pub command: String,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleVoice {
    pub name: String,
    /// Reference audio file, relative to the voices directory.
    pub file: String,
}

impl Default for MesmerConfig {
    fn default() -> Self {
        let languages = [
            ("en", "English"),
            ("fr", "French"),
            ("de", "German"),
            ("es", "Spanish"),
            ("it", "Italian"),
            ("ja", "Japanese"),
            ("zh", "Chinese"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        let sample_voices = BTreeMap::from([(
            "male1".to_string(),
            SampleVoice {
                name: "Male Voice 1".to_string(),
                file: "de-male-calm.mp3".to_string(),
            },
        )]);

        Self {
            data_dir: PathBuf::from("data"),
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            tasks: TaskConfig::default(),
            engine: EngineConfig::default(),
            languages,
            sample_voices,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            archive_url: String::new(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_capacity: 64,
            job_timeout_secs: 900,
            reaper_interval_secs: 60,
            stuck_after_secs: 1800,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "xtts-cli".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl MesmerConfig {
    /// Load from `mesmer.toml` (if present) and `MESMER_*` env overrides, e.g.
    /// `MESMER_SERVER__PORT=8080`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("mesmer")
    }

    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("MESMER").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let cfg: MesmerConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.max_concurrent == 0 {
            return Err(ConfigError::Validation {
                field: "tasks.max_concurrent".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tasks.queue_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "tasks.queue_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.languages.is_empty() {
            return Err(ConfigError::Validation {
                field: "languages".to_string(),
                reason: "at least one language is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn voices_dir(&self) -> PathBuf {
        self.data_dir.join("voices")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("tts_model")
    }

    pub fn routines_file(&self) -> PathBuf {
        self.data_dir.join("routines.json")
    }

    pub fn sample_voice_path(&self, voice_id: &str) -> Option<PathBuf> {
        self.sample_voices
            .get(voice_id)
            .map(|v| self.voices_dir().join(&v.file))
    }

    /// Create the on-disk layout. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.data_dir.as_path(),
            &self.voices_dir(),
            &self.output_dir(),
            &self.model_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// True when `path` sits inside `dir` once both are normalized. Used by the
/// download handler to refuse traversal filenames.
pub fn is_within_dir(dir: &Path, path: &Path) -> bool {
    let canonical_dir = match dir.canonicalize() {
        Ok(d) => d,
        Err(_) => return false,
    };
    match path.canonicalize() {
        Ok(p) => p.starts_with(&canonical_dir),
        Err(_) => false,
    }
}
