//! Batch controller for file-mode pipelines.
//!
//! A single worker drains the queue entry by entry; files may be appended
//! mid-batch. Cancellation stops the worker at the next entry boundary and
//! marks everything still waiting as cancelled; outputs already written are
//! kept.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::Mutex;
use tracing::{info, warn};

use verba_export::{ExportTask, Sidecar, SidecarMetadata, TemplateContext};
use verba_foundation::error::AppError;
use verba_foundation::CancellationToken;
use verba_stt::{
    remove_repetitions, AlignSource, AudioInput, HallucinationFilter, ModelHandle,
    TranscribeOptions, WhisperResult,
};
use verba_translate::{translate_result, TranslateEngine};

use crate::media;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    FileImport,
    Refinement,
    Alignment,
    TranslateResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Waiting,
    Processing,
    Processed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub input: PathBuf,
    /// Prior JSON result for refinement/alignment/translate-result modes.
    pub prior: Option<PathBuf>,
    pub status: EntryStatus,
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// How translations run in file mode.
pub enum BatchTranslator {
    /// Same model, task=translate; serialized by the model lock.
    Model,
    External {
        engine: Arc<dyn TranslateEngine>,
        source: String,
        target: String,
    },
}

pub struct BatchDeps {
    pub model: Arc<ModelHandle>,
    pub options: TranscribeOptions,
    pub filter: HallucinationFilter,
    pub repetition_allowed: usize,
    /// Skip the transcribe step (translate-only runs on the model path).
    pub transcribe: bool,
    pub translator: Option<BatchTranslator>,
    pub export: ExportTask,
    pub context: TemplateContext,
    pub metadata: SidecarMetadata,
    /// Language hint for alignment.
    pub language_hint: Option<String>,
}

pub struct BatchController {
    mode: BatchMode,
    queue: Arc<Mutex<Vec<BatchEntry>>>,
    cancel: CancellationToken,
    processed: Arc<AtomicUsize>,
    started: Instant,
}

impl BatchController {
    pub fn new(mode: BatchMode, cancel: CancellationToken) -> Self {
        Self {
            mode,
            queue: Arc::new(Mutex::new(Vec::new())),
            cancel,
            processed: Arc::new(AtomicUsize::new(0)),
            started: Instant::now(),
        }
    }

    /// Append inputs to the queue. Valid before and during a run.
    pub fn enqueue(&self, inputs: impl IntoIterator<Item = PathBuf>) {
        let mut queue = self.queue.lock();
        for input in inputs {
            // Sibling JSON doubles as the prior result where a mode needs one
            let prior = input.with_extension("json");
            let prior = (prior != input && prior.exists()).then_some(prior);
            queue.push(BatchEntry {
                input,
                prior,
                status: EntryStatus::Waiting,
            });
        }
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            processed: self.processed.load(Ordering::Relaxed),
            total: self.queue.lock().len(),
            elapsed: self.started.elapsed(),
        }
    }

    pub fn entries(&self) -> Vec<BatchEntry> {
        self.queue.lock().clone()
    }

    /// Drain the queue. Per-entry failures mark the entry and continue;
    /// cancellation marks the rest and returns `AppError::Cancelled`.
    pub async fn run(&self, deps: &BatchDeps) -> Result<(), AppError> {
        let mut index = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                let mut queue = self.queue.lock();
                for entry in queue.iter_mut().skip(index) {
                    entry.status = EntryStatus::Cancelled;
                }
                return Err(AppError::Cancelled);
            }

            let next = {
                let mut queue = self.queue.lock();
                if index >= queue.len() {
                    break;
                }
                queue[index].status = EntryStatus::Processing;
                queue[index].clone()
            };
            info!("Processing {} ({:?})", next.input.display(), self.mode);

            let outcome = self.process_entry(&next, deps).await;
            let status = match outcome {
                Ok(()) => {
                    self.processed.fetch_add(1, Ordering::Relaxed);
                    EntryStatus::Processed
                }
                Err(e) => {
                    warn!("{} failed: {}", next.input.display(), e);
                    EntryStatus::Failed(e.to_string())
                }
            };
            self.queue.lock()[index].status = status;
            index += 1;
        }
        Ok(())
    }

    async fn process_entry(&self, entry: &BatchEntry, deps: &BatchDeps) -> Result<(), AppError> {
        let context = TemplateContext {
            file: entry
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string()),
            ..deps.context.clone()
        };

        match self.mode {
            BatchMode::FileImport => self.file_import(entry, deps, &context).await,
            BatchMode::Refinement => self.refinement(entry, deps, &context).await,
            BatchMode::Alignment => self.alignment(entry, deps, &context).await,
            BatchMode::TranslateResult => self.translate_prior(entry, deps, &context).await,
        }
    }

    async fn file_import(
        &self,
        entry: &BatchEntry,
        deps: &BatchDeps,
        context: &TemplateContext,
    ) -> Result<(), AppError> {
        let samples = media::load_audio(&entry.input)?;
        let audio = AudioInput::from_i16(&samples);

        let metadata = SidecarMetadata {
            filename: entry
                .input
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..deps.metadata.clone()
        }
        .stamped(Local::now());
        let sidecar = Sidecar::create(&deps.export.sidecar_path(context), &metadata)?;

        // Translate-only on the model path skips the transcribe pass
        let mut result = if deps.transcribe {
            let started = Instant::now();
            let transcribed = deps.model.transcribe(&audio, &deps.options).await;
            let ok = transcribed.is_ok();
            sidecar.record_transcribe(started.elapsed().as_secs_f64(), ok)?;
            let mut result =
                transcribed.map_err(|e| AppError::Fatal(format!("transcription: {}", e)))?;
            let language = result
                .language
                .clone()
                .or_else(|| deps.options.language.clone())
                .unwrap_or_else(|| "english".to_string());
            deps.filter.apply(&mut result, &language);
            remove_repetitions(&mut result, deps.repetition_allowed);
            result
        } else {
            WhisperResult::empty()
        };

        if let Some(translator) = &deps.translator {
            let started = Instant::now();
            let translated = match translator {
                BatchTranslator::Model => deps
                    .model
                    .translate(&audio, &deps.options)
                    .await
                    .map_err(|e| e.to_string()),
                BatchTranslator::External {
                    engine,
                    source,
                    target,
                } => {
                    let engine = engine.clone();
                    let source = source.clone();
                    let target = target.clone();
                    let mut pending = result.clone();
                    tokio::task::spawn_blocking(move || {
                        translate_result(engine.as_ref(), &mut pending, &source, &target)
                            .map(|_| pending)
                            .map_err(|e| e.to_string())
                    })
                    .await
                    .map_err(|e| AppError::Fatal(e.to_string()))?
                }
            };
            let ok = translated.is_ok();
            sidecar.record_translate(started.elapsed().as_secs_f64(), ok)?;
            match translated {
                Ok(t) => result = t,
                // Keep the transcription when only translation failed
                Err(e) if deps.transcribe => warn!("Translation skipped: {}", e),
                Err(e) => return Err(AppError::Fatal(format!("translation: {}", e))),
            }
        }

        deps.export.export(&result, context)?;
        Ok(())
    }

    async fn refinement(
        &self,
        entry: &BatchEntry,
        deps: &BatchDeps,
        context: &TemplateContext,
    ) -> Result<(), AppError> {
        let samples = media::load_audio(&entry.input)?;
        let audio = AudioInput::from_i16(&samples);
        let prior = read_prior(entry)?;

        let refined = match deps.model.refine(&audio, &prior).await {
            Ok(refined) => refined,
            Err(first_err) if prior.segments.iter().any(|s| s.tokens.is_empty()) => {
                // Tokenless priors cannot be refined directly; re-transcribe
                // with the current model and retry once
                info!(
                    "Refinement blocked ({}), re-transcribing {}",
                    first_err,
                    entry.input.display()
                );
                let fresh = deps
                    .model
                    .transcribe(&audio, &deps.options)
                    .await
                    .map_err(|e| AppError::Fatal(format!("re-transcription: {}", e)))?;
                deps.model
                    .refine(&audio, &fresh)
                    .await
                    .map_err(|e| AppError::Fatal(format!("refinement retry: {}", e)))?
            }
            Err(e) => return Err(AppError::Fatal(format!("refinement: {}", e))),
        };

        deps.export.export(&refined, context)?;
        Ok(())
    }

    async fn alignment(
        &self,
        entry: &BatchEntry,
        deps: &BatchDeps,
        context: &TemplateContext,
    ) -> Result<(), AppError> {
        let samples = media::load_audio(&entry.input)?;
        let audio = AudioInput::from_i16(&samples);

        // Prior JSON result preferred; a sibling .txt is the plain-text
        // alternative source
        let prior = match read_prior(entry) {
            Ok(result) => AlignSource::Result(result),
            Err(_) => {
                let txt = entry.input.with_extension("txt");
                let text = std::fs::read_to_string(&txt).map_err(|e| {
                    AppError::Config(format!("no prior result or text for alignment: {}", e))
                })?;
                AlignSource::Text(text.trim().to_string())
            }
        };

        let aligned = deps
            .model
            .align(&audio, &prior, deps.language_hint.as_deref())
            .await
            .map_err(|e| AppError::Fatal(format!("alignment: {}", e)))?;
        deps.export.export(&aligned, context)?;
        Ok(())
    }

    async fn translate_prior(
        &self,
        entry: &BatchEntry,
        deps: &BatchDeps,
        context: &TemplateContext,
    ) -> Result<(), AppError> {
        // The entry itself is the JSON result to translate
        let mut result = read_result(&entry.input)?;
        let Some(BatchTranslator::External {
            engine,
            source,
            target,
        }) = &deps.translator
        else {
            return Err(AppError::Config(
                "translate-results mode needs an external translation engine".into(),
            ));
        };

        let engine = engine.clone();
        let source = source.clone();
        let target = target.clone();
        let translated = tokio::task::spawn_blocking(move || {
            translate_result(engine.as_ref(), &mut result, &source, &target).map(|_| result)
        })
        .await
        .map_err(|e| AppError::Fatal(e.to_string()))?
        .map_err(AppError::Translate)?;

        deps.export.export(&translated, context)?;
        Ok(())
    }
}

fn read_prior(entry: &BatchEntry) -> Result<WhisperResult, AppError> {
    let path = entry.prior.as_ref().ok_or_else(|| {
        AppError::Config(format!(
            "no prior result next to {}",
            entry.input.display()
        ))
    })?;
    read_result(path)
}

fn read_result(path: &Path) -> Result<WhisperResult, AppError> {
    let body = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&body)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use verba_export::{ExportFormat, SegmentLimits};
    use verba_stt::{Backend, MockEngine, ModelSpec};

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn deps(dir: &Path, engine: MockEngine) -> BatchDeps {
        let cache = std::env::temp_dir();
        let spec = ModelSpec::resolve("base", Backend::Primary, &cache).unwrap();
        BatchDeps {
            model: Arc::new(ModelHandle::new(spec, Box::new(engine))),
            options: TranscribeOptions::default(),
            filter: HallucinationFilter::empty(),
            repetition_allowed: 0,
            transcribe: true,
            translator: None,
            export: ExportTask {
                output_dir: dir.to_path_buf(),
                name_template: "{file}".into(),
                formats: vec![ExportFormat::Json, ExportFormat::Txt],
                segment_limits: SegmentLimits::default(),
                word_level: false,
            },
            context: TemplateContext::default(),
            metadata: SidecarMetadata {
                task: "transcribe".into(),
                model: "base".into(),
                ..Default::default()
            },
            language_hint: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_import_exports_and_annotates_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("talk.wav");
        write_wav(&wav, &vec![500; 16_000]);

        let controller = BatchController::new(BatchMode::FileImport, CancellationToken::new());
        controller.enqueue([wav]);
        controller
            .run(&deps(dir.path(), MockEngine::with_transcription("imported text")))
            .await
            .unwrap();

        let entries = controller.entries();
        assert_eq!(entries[0].status, EntryStatus::Processed);
        assert!(dir.path().join("talk.txt").exists());
        assert!(dir.path().join("talk.json").exists());

        let sidecar: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("talk_metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(sidecar["transcribe_success"], true);
        assert!(sidecar["transcribe_time"].is_number());
        assert_eq!(sidecar["filename"], "talk.wav");

        let progress = controller.progress();
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.total, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_entry_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_wav(&good, &vec![500; 1600]);
        let missing = dir.path().join("missing.wav");

        let controller = BatchController::new(BatchMode::FileImport, CancellationToken::new());
        controller.enqueue([missing, good]);
        controller
            .run(&deps(dir.path(), MockEngine::default()))
            .await
            .unwrap();

        let entries = controller.entries();
        assert!(matches!(entries[0].status, EntryStatus::Failed(_)));
        assert_eq!(entries[1].status, EntryStatus::Processed);
        assert_eq!(controller.progress().processed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_marks_waiting_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, &vec![1; 160]);
        write_wav(&b, &vec![1; 160]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let controller = BatchController::new(BatchMode::FileImport, cancel);
        controller.enqueue([a, b]);

        let err = controller
            .run(&deps(dir.path(), MockEngine::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(controller
            .entries()
            .iter()
            .all(|e| e.status == EntryStatus::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tokenless_prior_is_retranscribed_then_refined() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("speech.wav");
        write_wav(&wav, &vec![500; 16_000]);

        // Prior with null tokens blocks direct refinement
        let mut prior = WhisperResult::synthetic("rough draft", Some("en"), 1.0);
        prior.segments[0].tokens.clear();
        std::fs::write(
            dir.path().join("speech.json"),
            serde_json::to_string(&prior).unwrap(),
        )
        .unwrap();

        let controller = BatchController::new(BatchMode::Refinement, CancellationToken::new());
        controller.enqueue([wav]);
        controller
            .run(&deps(dir.path(), MockEngine::with_transcription("clean take")))
            .await
            .unwrap();

        assert_eq!(controller.entries()[0].status, EntryStatus::Processed);
        let out: WhisperResult = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("speech_2.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(out.text, "clean take");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mid_batch_enqueue_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, &vec![1; 1600]);
        write_wav(&b, &vec![1; 1600]);

        let controller = Arc::new(BatchController::new(
            BatchMode::FileImport,
            CancellationToken::new(),
        ));
        controller.enqueue([a]);
        // Appending before the worker reaches the end of the queue
        controller.enqueue([b]);

        controller
            .run(&deps(dir.path(), MockEngine::default()))
            .await
            .unwrap();
        assert_eq!(controller.progress().processed, 2);
    }
}
