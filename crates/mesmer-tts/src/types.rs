//! Core types for text-to-speech synthesis

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One fully resolved synthesis job, as handed to an engine.
///
/// Validation (known language, existing reference file) happens before this
/// struct is built; engines may still reject inputs they cannot handle.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    /// Language code, e.g. "en"
    pub language: String,
    /// Reference audio the voice is cloned from
    pub voice_reference: PathBuf,
}

/// What an engine reports after writing the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOutput {
    /// Size of the written artifact in bytes
    pub bytes: u64,
}

/// A selectable reference voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Unique voice identifier
    pub id: String,
    /// Human-readable voice name
    pub name: String,
}
