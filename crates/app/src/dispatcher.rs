//! Translator dispatcher.
//!
//! Each committed utterance arrives as a job. The STT-model path re-runs the
//! audio with task=translate, serialized against the scheduler by the model
//! lock; the external path batches the segment texts over HTTP from a
//! blocking task. Failures skip the translation and keep the transcription.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use verba_foundation::CancellationToken;
use verba_render::{ResultStore, Sentence};
use verba_stt::{AudioInput, ModelHandle, TranscribeOptions};
use verba_telemetry::PipelineMetrics;
use verba_translate::{translate_result, TranslateEngine};

use crate::scheduler::TranslateJob;

pub enum TranslatePath {
    /// Same STT model, task=translate (English only). Serialized with
    /// transcription through the model lock.
    Model {
        handle: Arc<ModelHandle>,
        options: TranscribeOptions,
    },
    /// External HTTP engine over the segment texts.
    External {
        engine: Arc<dyn TranslateEngine>,
        source: String,
        target: String,
    },
}

pub struct Dispatcher {
    handle: JoinHandle<()>,
}

impl Dispatcher {
    pub fn spawn(
        path: TranslatePath,
        mut jobs: mpsc::Receiver<TranslateJob>,
        store: Arc<Mutex<ResultStore>>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = jobs.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                match translate_job(&path, job).await {
                    Ok((utterance_id, sentence)) => {
                        metrics.translations.fetch_add(1, Ordering::Relaxed);
                        store.lock().attach_translation(utterance_id, sentence);
                    }
                    Err((utterance_id, e)) => {
                        // Transcription is already committed; only the
                        // translation slot stays empty
                        metrics.translate_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Translation of utterance {} skipped: {}", utterance_id, e);
                    }
                }
            }
            debug!("Dispatcher stopped");
        });

        Self { handle }
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn translate_job(
    path: &TranslatePath,
    job: TranslateJob,
) -> Result<(u64, Sentence), (u64, String)> {
    let utterance_id = job.utterance_id;
    match path {
        TranslatePath::Model { handle, options } => {
            let audio = AudioInput::from_i16(&job.samples);
            let result = handle
                .translate(&audio, options)
                .await
                .map_err(|e| (utterance_id, e.to_string()))?;
            Ok((utterance_id, Sentence::Structured(result)))
        }
        TranslatePath::External {
            engine,
            source,
            target,
        } => {
            let engine = engine.clone();
            let source = source.clone();
            let target = target.clone();
            let mut result = job.result;
            let outcome = tokio::task::spawn_blocking(move || {
                translate_result(engine.as_ref(), &mut result, &source, &target)
                    .map(|_| result)
            })
            .await
            .map_err(|e| (utterance_id, e.to_string()))?;
            let result = outcome.map_err(|e| (utterance_id, e.to_string()))?;
            Ok((utterance_id, Sentence::Structured(result)))
        }
    }
}
