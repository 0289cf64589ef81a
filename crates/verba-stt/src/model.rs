use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::{AlignSource, AudioInput, SttEngine};
use crate::types::{TranscribeOptions, WhisperResult};
use verba_foundation::error::ModelError;

/// Known checkpoint keys, matching upstream Whisper naming.
pub const MODEL_KEYS: [&str; 11] = [
    "tiny", "tiny.en", "base", "base.en", "small", "small.en", "medium", "medium.en", "large-v1",
    "large-v2", "large-v3",
];

/// Which model distribution a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Single-file checkpoint; the download URL embeds its SHA-256.
    Primary,
    /// Multi-file converted repo; verified by absence of in-progress markers.
    Faster,
}

/// Upstream per-checkpoint SHA-256 digests. The digest doubles as the URL
/// path component on the distribution host.
fn primary_digest(key: &str) -> Option<&'static str> {
    Some(match key {
        "tiny" => "65147644a518d12f04e32d6f3b26facc3f8dd46e5390956a9424a650c0ce22b9",
        "tiny.en" => "d3dd57d32accea0b295c96e26691aa14d8822fac7d9d27d5dc00b4ca2826dd03",
        "base" => "ed3a0b6b1c0edf879ad9b11b1af5a0e6ab5db9205f891f668f8b0e6c6326e34e",
        "base.en" => "25a8566e1d0c1e2231d1c762132cd20e0f96a85d16145c3a00adf5d1ac670ead",
        "small" => "9ecf779972d90ba49c06d968637d720dd632c55bbf19d441fb42bf17a411e794",
        "small.en" => "f953ad0fd29cacd07d5a9eda5624af0f6bcf2258be67c92b79389873d91e0872",
        "medium" => "345ae4da62f9b3d59415adc60127b97c714f32e89e936602e85993674d08dcb1",
        "medium.en" => "d7440d1dc186f76616474e0ff0b3b6b879abc9d1a4926b7adfa41db2d497ab4f",
        "large-v1" => "e4b87e7e0bf463eb8e6956e646f1e277e901512310def2c24bf0e11bd3c28e9a",
        "large-v2" => "81f7c96c852ee8fc832187b0132e569d6c3065a3252ed18e56effd0b6a73e524",
        "large-v3" => "e5b1a55b89c1367dacf97e3e19bfd829a01529dbfdeefa8caeb59b3f1b81dadb",
        _ => return None,
    })
}

/// A resolved model: key, backend, verification material, on-disk path.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub key: String,
    pub backend: Backend,
    /// SHA-256 for the primary backend.
    pub digest: Option<String>,
    /// Hub repo id for the faster backend.
    pub repo_id: Option<String>,
    pub path: PathBuf,
}

impl ModelSpec {
    pub fn resolve(key: &str, backend: Backend, cache_root: &PathBuf) -> Result<Self, ModelError> {
        if !MODEL_KEYS.contains(&key) {
            return Err(ModelError::UnknownKey(key.to_string()));
        }
        match backend {
            Backend::Primary => {
                let digest = primary_digest(key)
                    .ok_or_else(|| ModelError::UnknownKey(key.to_string()))?;
                Ok(Self {
                    key: key.to_string(),
                    backend,
                    digest: Some(digest.to_string()),
                    repo_id: None,
                    path: cache_root.join("whisper").join(format!("{}.pt", key)),
                })
            }
            Backend::Faster => {
                let repo_id = format!("Systran/faster-whisper-{}", key);
                let dir = format!("models--{}", repo_id.replace('/', "--"));
                Ok(Self {
                    key: key.to_string(),
                    backend,
                    digest: None,
                    repo_id: Some(repo_id),
                    path: cache_root.join("faster-whisper").join(dir),
                })
            }
        }
    }

    pub fn download_url(&self) -> Option<String> {
        match self.backend {
            Backend::Primary => self.digest.as_ref().map(|d| {
                format!(
                    "https://openaipublic.azureedge.net/main/whisper/models/{}/{}.pt",
                    d, self.key
                )
            }),
            Backend::Faster => None,
        }
    }

    /// Files fetched for a faster-backend snapshot.
    pub fn faster_files(&self) -> &'static [&'static str] {
        &["model.bin", "config.json", "tokenizer.json", "vocabulary.txt"]
    }

    pub fn faster_file_url(&self, file: &str) -> Option<String> {
        self.repo_id
            .as_ref()
            .map(|repo| format!("https://huggingface.co/{}/resolve/main/{}", repo, file))
    }
}

/// Model cache root: `$XDG_CACHE_HOME/verba` or the platform cache dir.
pub fn cache_root() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("verba");
        }
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("verba")
}

/// A loaded model behind the session's exclusive lock. Transcribe and
/// translate on the same handle never overlap.
#[derive(Clone)]
pub struct ModelHandle {
    spec: ModelSpec,
    engine: Arc<Mutex<Box<dyn SttEngine>>>,
}

impl ModelHandle {
    pub fn new(spec: ModelSpec, engine: Box<dyn SttEngine>) -> Self {
        Self {
            spec,
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub async fn transcribe(
        &self,
        audio: &AudioInput,
        options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError> {
        let engine = self.engine.lock().await;
        engine.transcribe(audio, options).await
    }

    pub async fn translate(
        &self,
        audio: &AudioInput,
        options: &TranscribeOptions,
    ) -> Result<WhisperResult, ModelError> {
        let engine = self.engine.lock().await;
        engine.translate(audio, options).await
    }

    pub async fn align(
        &self,
        audio: &AudioInput,
        prior: &AlignSource,
        language: Option<&str>,
    ) -> Result<WhisperResult, ModelError> {
        let engine = self.engine.lock().await;
        engine.align(audio, prior, language).await
    }

    pub async fn refine(
        &self,
        audio: &AudioInput,
        prior: &WhisperResult,
    ) -> Result<WhisperResult, ModelError> {
        let engine = self.engine.lock().await;
        engine.refine(audio, prior).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_is_rejected() {
        let root = PathBuf::from("/tmp/cache");
        assert!(matches!(
            ModelSpec::resolve("enormous-v9", Backend::Primary, &root),
            Err(ModelError::UnknownKey(_))
        ));
    }

    #[test]
    fn primary_url_embeds_digest() {
        let root = PathBuf::from("/tmp/cache");
        let spec = ModelSpec::resolve("base", Backend::Primary, &root).unwrap();
        let url = spec.download_url().unwrap();
        assert!(url.contains(spec.digest.as_ref().unwrap()));
        assert!(url.ends_with("/base.pt"));
    }

    #[test]
    fn faster_spec_has_repo_and_no_digest() {
        let root = PathBuf::from("/tmp/cache");
        let spec = ModelSpec::resolve("small.en", Backend::Faster, &root).unwrap();
        assert!(spec.digest.is_none());
        assert_eq!(spec.repo_id.as_deref(), Some("Systran/faster-whisper-small.en"));
        assert!(spec
            .path
            .ends_with("faster-whisper/models--Systran--faster-whisper-small.en"));
    }

    #[test]
    fn cache_root_honours_xdg_override() {
        // Env mutation is process-global; restore afterwards.
        let saved = std::env::var("XDG_CACHE_HOME").ok();
        std::env::set_var("XDG_CACHE_HOME", "/tmp/xdg-test");
        assert_eq!(cache_root(), PathBuf::from("/tmp/xdg-test/verba"));
        match saved {
            Some(v) => std::env::set_var("XDG_CACHE_HOME", v),
            None => std::env::remove_var("XDG_CACHE_HOME"),
        }
    }

    #[test]
    fn every_key_has_a_primary_digest() {
        let root = PathBuf::from("/tmp/cache");
        for key in MODEL_KEYS {
            assert!(ModelSpec::resolve(key, Backend::Primary, &root).is_ok(), "{}", key);
        }
    }
}
