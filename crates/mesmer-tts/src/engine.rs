//! TTS engine abstraction

use crate::error::TtsResult;
use crate::types::{SynthesisOutput, SynthesisRequest};
use async_trait::async_trait;
use std::path::Path;

/// Core TTS engine interface
///
/// Implementations wrap a specific synthesis backend. Methods take `&self`:
/// the task runner drives several jobs concurrently and engines are expected
/// to use interior mutability for any per-call state.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Engine name/identifier
    fn name(&self) -> &str;

    /// Check if the engine can run on this system
    async fn is_available(&self) -> bool;

    /// Synthesize `request` into a file at `out_path`.
    ///
    /// The file must exist and be non-empty on `Ok`; on any error the engine
    /// must not leave a partial file behind that a caller could mistake for a
    /// finished artifact.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        out_path: &Path,
    ) -> TtsResult<SynthesisOutput>;
}
