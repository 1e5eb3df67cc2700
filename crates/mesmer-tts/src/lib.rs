//! Text-to-speech abstraction layer for Mesmer
//!
//! Provides the engine trait the task runner drives, the request/output
//! types, and two implementations: a process-backed XTTS engine and a
//! scriptable mock for tests.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod engine;
pub mod engines;
pub mod error;
pub mod types;

pub use engine::TtsEngine;
pub use engines::mock::{MockConfig, MockEngine};
pub use engines::xtts::XttsProcessEngine;
pub use error::{TtsError, TtsResult};
pub use types::{SynthesisOutput, SynthesisRequest, VoiceInfo};

/// Generates unique synthesis ids for log correlation.
static SYNTHESIS_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_synthesis_id() -> u64 {
    SYNTHESIS_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}
