//! Error types for TTS functionality

use thiserror::Error;

/// TTS error types
#[derive(Error, Debug)]
pub enum TtsError {
    /// Engine binary missing or not runnable
    #[error("TTS engine not available: {0}")]
    EngineNotAvailable(String),

    /// Invalid text input
    #[error("Invalid text input: {0}")]
    InvalidInput(String),

    /// Missing or unreadable voice reference
    #[error("Voice reference not usable: {0}")]
    VoiceReference(String),

    /// Synthesis ran and failed
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    /// IO error (file operations, process spawning, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for TTS operations
pub type TtsResult<T> = Result<T, TtsError>;
