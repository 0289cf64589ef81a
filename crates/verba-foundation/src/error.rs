use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Audio subsystem error: {0}")]
    Audio(#[from] AudioError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("ffmpeg binary not found on PATH; file import is unavailable")]
    FfmpegMissing,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Device does not support the requested operation: {reason}")]
    DeviceUnsupported { reason: String },

    #[error("Failed to open device {name:?}: {reason}")]
    DeviceOpenFailed { name: Option<String>, reason: String },

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Buffer overflow, dropped {count} samples")]
    BufferOverflow { count: usize },

    #[error("No audio data for {duration:?}")]
    NoDataTimeout { duration: Duration },

    #[error("Audio processing failed: {0}")]
    Processing(String),

    #[error("CPAL error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model {key} is not downloaded")]
    NotDownloaded { key: String },

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Transcription failed: {0}")]
    TranscribeFailed(String),

    #[error("Unknown model key: {0}")]
    UnknownKey(String),

    #[error("Task not supported: {0}")]
    UnsupportedTask(String),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Language pair {source_lang}->{target_lang} not supported by {engine}")]
    UnsupportedPair {
        engine: String,
        source_lang: String,
        target_lang: String,
    },

    #[error("Engine error: {0}")]
    Engine(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid template: {0}")]
    Template(String),
}

#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Ignore,
    Restart,
    Fatal,
}

impl AppError {
    /// Classify the error for the session supervisor. Transient stage errors
    /// keep the pipeline alive; startup errors end the session.
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            AppError::Audio(AudioError::Processing(_))
            | AppError::Audio(AudioError::BufferOverflow { .. })
            | AppError::Translate(_)
            | AppError::Export(_) => RecoveryStrategy::Ignore,
            AppError::Audio(AudioError::DeviceDisconnected) => RecoveryStrategy::Retry {
                max_attempts: 5,
                delay: Duration::from_secs(2),
            },
            AppError::Download(DownloadError::Network(_)) => RecoveryStrategy::Retry {
                max_attempts: 1,
                delay: Duration::from_secs(1),
            },
            AppError::Cancelled => RecoveryStrategy::Ignore,
            AppError::Model(_)
            | AppError::Audio(_)
            | AppError::Config(_)
            | AppError::FfmpegMissing
            | AppError::Fatal(_)
            | AppError::Download(_) => RecoveryStrategy::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_ignored() {
        let err = AppError::Translate(TranslateError::Network("offline".into()));
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Ignore));

        let err = AppError::Audio(AudioError::Processing("resample".into()));
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Ignore));
    }

    #[test]
    fn unsupported_pair_formats_languages() {
        let err = TranslateError::UnsupportedPair {
            engine: "libre".into(),
            source_lang: "english".into(),
            target_lang: "klingon".into(),
        };
        assert_eq!(
            err.to_string(),
            "Language pair english->klingon not supported by libre"
        );
        // The language fields are plain data, not an error cause
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn startup_errors_are_fatal() {
        let err = AppError::Audio(AudioError::DeviceNotFound { name: None });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Fatal));

        let err = AppError::Model(ModelError::NotDownloaded { key: "base".into() });
        assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Fatal));
    }
}
