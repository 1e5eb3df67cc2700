//! Mock TTS engine for testing
//!
//! Scriptable stand-in for a real synthesis backend: succeed after a delay,
//! fail N times then succeed, fail always, or hang until cancelled.

use crate::engine::TtsEngine;
use crate::error::{TtsError, TtsResult};
use crate::types::{SynthesisOutput, SynthesisRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for mock synthesis behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Simulated processing delay per call
    pub delay: Option<Duration>,

    /// Error message returned instead of producing output
    pub failure: Option<String>,

    /// Fail only the first N calls, then succeed
    pub fail_times: Option<usize>,

    /// Never return; used to exercise job timeouts
    pub hang: bool,

    /// Size of the artifact written on success
    pub output_bytes: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            delay: None,
            failure: None,
            fail_times: None,
            hang: false,
            output_bytes: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: usize,
}

#[derive(Clone)]
pub struct MockEngine {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(MockConfig::default())
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(MockConfig {
            failure: Some(message.into()),
            ..Default::default()
        })
    }

    /// Fail the first `times` calls, succeed afterwards.
    pub fn failing_times(times: usize, message: impl Into<String>) -> Self {
        Self::new(MockConfig {
            failure: Some(message.into()),
            fail_times: Some(times),
            ..Default::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn hanging() -> Self {
        Self::new(MockConfig {
            hang: true,
            ..Default::default()
        })
    }

    /// Number of synthesize calls observed so far.
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }
}

#[async_trait]
impl TtsEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        out_path: &Path,
    ) -> TtsResult<SynthesisOutput> {
        let call = {
            let mut state = self.state.lock();
            state.calls += 1;
            state.calls
        };

        if self.config.hang {
            // Pends forever; the caller's timeout is responsible for escape.
            std::future::pending::<()>().await;
        }

        if let Some(delay) = self.config.delay {
            tokio::time::sleep(delay).await;
        }

        if request.text.trim().is_empty() {
            return Err(TtsError::InvalidInput("empty text".to_string()));
        }

        if let Some(message) = &self.config.failure {
            let still_failing = match self.config.fail_times {
                Some(times) => call <= times,
                None => true,
            };
            if still_failing {
                return Err(TtsError::SynthesisFailed(message.clone()));
            }
        }

        tokio::fs::write(out_path, vec![0u8; self.config.output_bytes]).await?;
        Ok(SynthesisOutput {
            bytes: self.config.output_bytes as u64,
        })
    }
}
