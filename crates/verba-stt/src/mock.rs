//! Configurable mock engine for exercising the pipeline without a model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{AlignSource, AudioInput, SttEngine};
use crate::types::{Task, TranscribeOptions, WhisperResult};
use verba_foundation::error::ModelError;

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Text returned for task=transcribe.
    pub transcription: String,
    /// Text returned for task=translate.
    pub translation: String,
    pub language: String,
    /// Simulated processing delay.
    pub delay: Duration,
    /// Fail every call after this many successes.
    pub fail_after_calls: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            transcription: "mock transcription".into(),
            translation: "mock translation".into(),
            language: "en".into(),
            delay: Duration::ZERO,
            fail_after_calls: None,
        }
    }
}

pub struct MockEngine {
    config: MockConfig,
    calls: AtomicUsize,
    /// Task of each call, in order, for asserting serialization.
    pub call_log: Mutex<Vec<Task>>,
}

impl MockEngine {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            calls: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_transcription(text: &str) -> Self {
        Self::new(MockConfig {
            transcription: text.into(),
            ..Default::default()
        })
    }

    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), ModelError> {
        let made = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.config.fail_after_calls {
            if made >= limit {
                return Err(ModelError::TranscribeFailed("mock failure injected".into()));
            }
        }
        Ok(())
    }

    fn duration_of(audio: &AudioInput) -> f64 {
        audio.duration_secs().unwrap_or(1.0)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

#[async_trait]
impl SttEngine for MockEngine {
    async fn transcribe(
        &self,
        audio: &AudioInput,
        options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError> {
        self.check_failure()?;
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        self.call_log
            .lock()
            .map_err(|_| ModelError::TranscribeFailed("mock lock poisoned".into()))?
            .push(options.task);

        let text = match options.task {
            Task::Transcribe => &self.config.transcription,
            Task::Translate => &self.config.translation,
        };
        let language = match options.task {
            Task::Translate => "en",
            Task::Transcribe => options
                .language
                .as_deref()
                .unwrap_or(&self.config.language),
        };
        Ok(WhisperResult::synthetic(
            text,
            Some(language),
            Self::duration_of(audio),
        ))
    }

    async fn align(
        &self,
        audio: &AudioInput,
        prior: &AlignSource,
        language: Option<&str>,
    ) -> Result<WhisperResult, ModelError> {
        self.check_failure()?;
        let text = match prior {
            AlignSource::Result(result) => result.text.clone(),
            AlignSource::Text(text) => text.clone(),
        };
        Ok(WhisperResult::synthetic(
            &text,
            language.or(Some(&self.config.language)),
            Self::duration_of(audio),
        ))
    }

    async fn refine(
        &self,
        _audio: &AudioInput,
        prior: &WhisperResult,
    ) -> Result<WhisperResult, ModelError> {
        self.check_failure()?;
        // Refinement must not succeed on null tokens; the batch controller
        // re-transcribes and retries in that case.
        if prior.segments.iter().any(|s| s.tokens.is_empty()) {
            return Err(ModelError::TranscribeFailed(
                "prior result has no tokens to refine".into(),
            ));
        }
        Ok(prior.clone())
    }
}
