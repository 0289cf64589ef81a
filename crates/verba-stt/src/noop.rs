//! Fallback engine used when no inference backend is compiled in.

use async_trait::async_trait;

use crate::engine::{AlignSource, AudioInput, EngineLoader, SttEngine};
use crate::model::ModelSpec;
use crate::types::{TranscribeOptions, WhisperResult};
use verba_foundation::error::ModelError;

/// Accepts every call and produces empty results. Keeps the pipeline
/// runnable end to end on hosts without an inference runtime.
pub struct NoOpEngine;

#[async_trait]
impl SttEngine for NoOpEngine {
    async fn transcribe(
        &self,
        _audio: &AudioInput,
        _options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError> {
        Ok(WhisperResult::empty())
    }

    async fn align(
        &self,
        _audio: &AudioInput,
        _prior: &AlignSource,
        _language: Option<&str>,
    ) -> Result<WhisperResult, ModelError> {
        Ok(WhisperResult::empty())
    }

    async fn refine(
        &self,
        _audio: &AudioInput,
        prior: &WhisperResult,
    ) -> Result<WhisperResult, ModelError> {
        Ok(prior.clone())
    }
}

pub struct NoOpLoader;

impl EngineLoader for NoOpLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn SttEngine>, ModelError> {
        tracing::warn!(
            "No inference backend available; model {} loads as a no-op engine",
            spec.key
        );
        Ok(Box::new(NoOpEngine))
    }
}
