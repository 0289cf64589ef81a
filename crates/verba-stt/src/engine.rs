use async_trait::async_trait;
use std::path::PathBuf;

use crate::types::{Task, TranscribeOptions, WhisperResult};
use verba_foundation::error::ModelError;

/// Audio handed to an engine: either a file on disk or decoded 16 kHz mono
/// float PCM.
#[derive(Debug, Clone)]
pub enum AudioInput {
    File(PathBuf),
    Pcm(Vec<f32>),
}

impl AudioInput {
    /// Convert a PCM16 slice into the float form engines expect.
    pub fn from_i16(samples: &[i16]) -> Self {
        AudioInput::Pcm(samples.iter().map(|&s| s as f32 / 32768.0).collect())
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match self {
            AudioInput::Pcm(samples) => Some(samples.len() as f64 / 16_000.0),
            AudioInput::File(_) => None,
        }
    }
}

/// Prior material for forced alignment: a structured result or raw text.
#[derive(Debug, Clone)]
pub enum AlignSource {
    Result(WhisperResult),
    Text(String),
}

/// A loaded STT backend. Implementations must be safe to call from a
/// blocking context; the model lock above them serializes transcribe and
/// translate.
#[async_trait]
pub trait SttEngine: Send + Sync {
    async fn transcribe(
        &self,
        audio: &AudioInput,
        options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError>;

    /// Translate-to-English task on the same audio.
    async fn translate(
        &self,
        audio: &AudioInput,
        options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError> {
        let mut opts = options.clone();
        opts.task = Task::Translate;
        self.transcribe(audio, &opts).await
    }

    async fn align(
        &self,
        audio: &AudioInput,
        prior: &AlignSource,
        language: Option<&str>,
    ) -> Result<WhisperResult, ModelError>;

    async fn refine(
        &self,
        audio: &AudioInput,
        prior: &WhisperResult,
    ) -> Result<WhisperResult, ModelError>;
}

/// Produces engines for verified on-disk models. Backends register a loader
/// so the model manager stays independent of any inference runtime.
pub trait EngineLoader: Send + Sync {
    fn load(&self, spec: &crate::model::ModelSpec) -> Result<Box<dyn SttEngine>, ModelError>;
}
