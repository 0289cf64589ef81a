//! Metadata sidecar written alongside exports.
//!
//! The sidecar is created before any processing so a crash still leaves a
//! record of what was attempted; completed steps reopen the file and add
//! their timing and outcome.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verba_foundation::error::ExportError;

use crate::formats::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SidecarMetadata {
    pub timestamp: String,
    pub task: String,
    pub filename: String,
    pub transcribe: bool,
    pub translate: bool,
    pub model: String,
    pub backend: String,
    pub engine: String,
    pub lang_source: String,
    pub lang_target: String,
    #[serde(default)]
    pub whisper_params: Value,
    #[serde(default)]
    pub model_params: Value,
}

impl SidecarMetadata {
    pub fn stamped(mut self, now: DateTime<Local>) -> Self {
        self.timestamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        self
    }
}

pub struct Sidecar {
    path: PathBuf,
}

impl Sidecar {
    /// Write the initial metadata file and return a handle for annotations.
    pub fn create(path: &Path, metadata: &SidecarMetadata) -> Result<Self, ExportError> {
        let body = serde_json::to_string_pretty(metadata)?;
        write_atomic(path, &body)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_transcribe(&self, elapsed_secs: f64, success: bool) -> Result<(), ExportError> {
        self.annotate(&[
            ("transcribe_time", Value::from(elapsed_secs)),
            ("transcribe_success", Value::from(success)),
        ])
    }

    pub fn record_translate(&self, elapsed_secs: f64, success: bool) -> Result<(), ExportError> {
        self.annotate(&[
            ("translate_time", Value::from(elapsed_secs)),
            ("translate_success", Value::from(success)),
        ])
    }

    /// Reopen, merge the new fields into the top-level object, rewrite.
    fn annotate(&self, fields: &[(&str, Value)]) -> Result<(), ExportError> {
        let body = std::fs::read_to_string(&self.path)?;
        let mut doc: Value = serde_json::from_str(&body)?;
        if let Some(map) = doc.as_object_mut() {
            for (key, value) in fields {
                map.insert((*key).to_string(), value.clone());
            }
        }
        write_atomic(&self.path, &serde_json::to_string_pretty(&doc)?)
    }
}
