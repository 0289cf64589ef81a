//! Transcript export: segment splitting, file naming, format writers and
//! the metadata sidecar.

pub mod formats;
pub mod sidecar;
pub mod split;
pub mod template;

use std::path::PathBuf;

use chrono::Local;
use tracing::info;
use verba_foundation::error::ExportError;
use verba_stt::WhisperResult;

pub use formats::{render, unique_path, write_atomic, ExportFormat};
pub use sidecar::{Sidecar, SidecarMetadata};
pub use split::{split_result, SegmentLimits};
pub use template::{expand, sanitize_file_name, TemplateContext};

/// Everything needed to write one result to disk.
#[derive(Debug, Clone)]
pub struct ExportTask {
    pub output_dir: PathBuf,
    pub name_template: String,
    pub formats: Vec<ExportFormat>,
    pub segment_limits: SegmentLimits,
    pub word_level: bool,
}

impl ExportTask {
    /// Split, name and write the result in every requested format.
    /// Returns the paths actually written.
    pub fn export(
        &self,
        result: &WhisperResult,
        context: &TemplateContext,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let prepared = split_result(result, &self.segment_limits);
        let stem = sanitize_file_name(&expand(&self.name_template, context, Local::now()));

        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let body = render(&prepared, *format, self.word_level)?;
            let path = unique_path(&self.output_dir, &stem, format.extension());
            write_atomic(&path, &body)?;
            info!(path = %path.display(), "wrote export");
            written.push(path);
        }
        Ok(written)
    }

    /// Sidecar path derived from the same name template.
    pub fn sidecar_path(&self, context: &TemplateContext) -> PathBuf {
        let stem = sanitize_file_name(&expand(&self.name_template, context, Local::now()));
        unique_path(&self.output_dir, &format!("{}_metadata", stem), "json")
    }
}
