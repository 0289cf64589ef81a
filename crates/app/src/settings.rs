//! Persisted settings: one JSON file, atomic replace on save.
//!
//! Every key has a serde default so a missing or partial file still loads;
//! out-of-range values are clamped on load rather than rejected.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use verba_foundation::error::AppError;

fn default_chunk_size() -> usize {
    1024
}
fn default_true() -> bool {
    true
}
fn default_threshold_db() -> f32 {
    -35.0
}
fn default_auto_mode() -> u8 {
    2
}
fn default_max_buffer() -> f32 {
    10.0
}
fn default_max_sentences() -> usize {
    4
}
fn default_transcribe_rate() -> u64 {
    300
}
fn default_max_temp() -> f32 {
    1.0
}
fn default_separator() -> String {
    "&#10;".to_string()
}
fn default_gradient_low() -> String {
    "#ff0000".to_string()
}
fn default_gradient_high() -> String {
    "#00ff00".to_string()
}
fn default_export_format() -> String {
    "srt".to_string()
}
fn default_export_template() -> String {
    "{file}_{task-short}".to_string()
}
fn default_repetition_allowed() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    // Microphone stream
    pub sample_rate_mic: Option<u32>,
    pub channels_mic: Option<u16>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_mic: usize,
    #[serde(default = "default_true")]
    pub auto_sample_rate_mic: bool,
    #[serde(default = "default_true")]
    pub auto_channels_mic: bool,

    // Speaker (loopback) stream
    pub sample_rate_speaker: Option<u32>,
    pub channels_speaker: Option<u16>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_speaker: usize,
    #[serde(default = "default_true")]
    pub auto_sample_rate_speaker: bool,
    #[serde(default = "default_true")]
    pub auto_channels_speaker: bool,

    // Gating
    pub threshold_enable_mic: bool,
    #[serde(default = "default_threshold_db")]
    pub threshold_db_mic: f32,
    pub threshold_auto_mic: bool,
    #[serde(default = "default_auto_mode")]
    pub threshold_auto_mode_mic: u8,
    pub auto_break_buffer_mic: bool,
    pub threshold_enable_speaker: bool,
    #[serde(default = "default_threshold_db")]
    pub threshold_db_speaker: f32,
    pub threshold_auto_speaker: bool,
    #[serde(default = "default_auto_mode")]
    pub threshold_auto_mode_speaker: u8,
    pub auto_break_buffer_speaker: bool,

    // Buffering and pacing
    #[serde(default = "default_max_buffer")]
    pub max_buffer_mic: f32,
    #[serde(default = "default_max_buffer")]
    pub max_buffer_speaker: f32,
    #[serde(default = "default_max_sentences")]
    pub max_sentences_mic: usize,
    #[serde(default = "default_max_sentences")]
    pub max_sentences_speaker: usize,
    #[serde(default = "default_transcribe_rate")]
    pub transcribe_rate: u64,

    // Decoding temperature
    pub use_temp: bool,
    pub keep_temp: bool,
    #[serde(default = "default_max_temp")]
    pub max_temp: f32,

    pub use_faster_whisper: bool,

    // Display composition
    #[serde(default = "default_separator")]
    pub separate_with: String,
    pub tb_mw_tc_max: usize,
    pub tb_mw_tc_max_per_line: usize,
    pub tb_mw_tl_max: usize,
    pub tb_mw_tl_max_per_line: usize,
    pub tb_ex_tc_max: usize,
    pub tb_ex_tc_max_per_line: usize,
    pub tb_ex_tl_max: usize,
    pub tb_ex_tl_max_per_line: usize,

    // Export segmentation
    pub segment_level: bool,
    pub word_level: bool,
    pub segment_max_words: Option<usize>,
    pub segment_max_chars: Option<usize>,
    pub segment_split_or_newline: bool,
    pub segment_even_split: bool,

    // Confidence colouring
    pub colorize_per_segment: bool,
    pub colorize_per_word: bool,
    #[serde(default = "default_gradient_low")]
    pub gradient_low_conf: String,
    #[serde(default = "default_gradient_high")]
    pub gradient_high_conf: String,

    // Hallucination filter
    pub filter_file_import: bool,
    pub path_filter_file_import: Option<PathBuf>,
    /// Consecutive near-duplicate segments kept per run; 0 disables removal.
    #[serde(default = "default_repetition_allowed")]
    pub repetition_allowed: usize,

    // Export targets
    #[serde(default = "default_export_format")]
    pub export_format: String,
    #[serde(default = "default_export_template")]
    pub export_to: String,
    pub dir_export: Option<PathBuf>,

    // Silence-break behaviour, see DESIGN notes
    #[serde(default = "default_true")]
    pub commit_translation_on_silence_break: bool,
}

/// The per-device subset the audio pipeline consumes.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub chunk_size: usize,
    pub threshold_enable: bool,
    pub threshold_db: f32,
    pub threshold_auto: bool,
    pub threshold_auto_mode: u8,
    pub auto_break_buffer: bool,
    pub max_buffer_secs: f32,
    pub max_sentences: usize,
}

impl Settings {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verba")
            .join("settings.json")
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(body) => serde_json::from_str(&body)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default_values(),
            Err(e) => return Err(AppError::Config(format!("{}: {}", path.display(), e))),
        };
        settings.normalize();
        Ok(settings)
    }

    /// Atomic replace: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::Config(format!("{}: {}", dir.display(), e)))?;
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        let tmp = dir.join(".settings.json.tmp");
        std::fs::write(&tmp, body).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn default_values() -> Self {
        // serde(default) carries the field defaults; deserializing an empty
        // object applies all of them
        serde_json::from_str("{}").unwrap_or_default()
    }

    /// Clamp user-editable ranges in place.
    pub fn normalize(&mut self) {
        self.threshold_auto_mode_mic = self.threshold_auto_mode_mic.clamp(1, 3);
        self.threshold_auto_mode_speaker = self.threshold_auto_mode_speaker.clamp(1, 3);
        self.max_buffer_mic = self.max_buffer_mic.clamp(1.0, 30.0);
        self.max_buffer_speaker = self.max_buffer_speaker.clamp(1.0, 30.0);
        self.max_sentences_mic = self.max_sentences_mic.clamp(1, 100);
        self.max_sentences_speaker = self.max_sentences_speaker.clamp(1, 100);
        self.transcribe_rate = self.transcribe_rate.clamp(1, 1000);
        self.max_temp = self.max_temp.clamp(0.0, 1.0);
        self.repetition_allowed = self.repetition_allowed.min(10);
    }

    pub fn mic(&self) -> DeviceSettings {
        DeviceSettings {
            sample_rate: if self.auto_sample_rate_mic {
                None
            } else {
                self.sample_rate_mic
            },
            channels: if self.auto_channels_mic {
                None
            } else {
                self.channels_mic
            },
            chunk_size: self.chunk_size_mic,
            threshold_enable: self.threshold_enable_mic,
            threshold_db: self.threshold_db_mic,
            threshold_auto: self.threshold_auto_mic,
            threshold_auto_mode: self.threshold_auto_mode_mic,
            auto_break_buffer: self.auto_break_buffer_mic,
            max_buffer_secs: self.max_buffer_mic,
            max_sentences: self.max_sentences_mic,
        }
    }

    pub fn speaker(&self) -> DeviceSettings {
        DeviceSettings {
            sample_rate: if self.auto_sample_rate_speaker {
                None
            } else {
                self.sample_rate_speaker
            },
            channels: if self.auto_channels_speaker {
                None
            } else {
                self.channels_speaker
            },
            chunk_size: self.chunk_size_speaker,
            threshold_enable: self.threshold_enable_speaker,
            threshold_db: self.threshold_db_speaker,
            threshold_auto: self.threshold_auto_speaker,
            threshold_auto_mode: self.threshold_auto_mode_speaker,
            auto_break_buffer: self.auto_break_buffer_speaker,
            max_buffer_secs: self.max_buffer_speaker,
            max_sentences: self.max_sentences_speaker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default_values();
        assert_eq!(s.chunk_size_mic, 1024);
        assert_eq!(s.transcribe_rate, 300);
        assert_eq!(s.max_sentences_mic, 4);
        assert!(s.auto_sample_rate_mic);
        assert_eq!(s.separate_with, "&#10;");
        assert!(s.commit_translation_on_silence_break);
        assert_eq!(s.repetition_allowed, 1);
    }

    #[test]
    fn repetition_allowed_is_clamped_and_can_disable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"repetition_allowed": 50}"#).unwrap();
        assert_eq!(Settings::load(&path).unwrap().repetition_allowed, 10);

        std::fs::write(&path, r#"{"repetition_allowed": 0}"#).unwrap();
        assert_eq!(Settings::load(&path).unwrap().repetition_allowed, 0);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(s.transcribe_rate, 300);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"transcribe_rate": 100, "threshold_db_mic": -20.5}"#).unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.transcribe_rate, 100);
        assert_eq!(s.threshold_db_mic, -20.5);
        assert_eq!(s.chunk_size_mic, 1024);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"transcribe_rate": 5000, "max_buffer_mic": 99.0, "max_sentences_mic": 0, "threshold_auto_mode_mic": 7}"#,
        )
        .unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.transcribe_rate, 1000);
        assert_eq!(s.max_buffer_mic, 30.0);
        assert_eq!(s.max_sentences_mic, 1);
        assert_eq!(s.threshold_auto_mode_mic, 3);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = Settings::default_values();
        s.threshold_enable_mic = true;
        s.threshold_db_mic = -18.0;
        s.save(&path).unwrap();

        let back = Settings::load(&path).unwrap();
        assert!(back.threshold_enable_mic);
        assert_eq!(back.threshold_db_mic, -18.0);
        // No temp file left behind
        assert!(!dir.path().join(".settings.json.tmp").exists());
    }

    #[test]
    fn auto_flags_suppress_fixed_values() {
        let mut s = Settings::default_values();
        s.sample_rate_mic = Some(48_000);
        assert_eq!(s.mic().sample_rate, None);
        s.auto_sample_rate_mic = false;
        assert_eq!(s.mic().sample_rate, Some(48_000));
    }
}
