//! Transcribe scheduler: the paced heart of the live pipeline.
//!
//! On each tick the scheduler drains the frame queue into the utterance
//! buffer, transcribes a snapshot of it, filters the result and publishes it
//! as the pending utterance. When the buffer breaks (max duration or
//! sustained silence) the pending result is committed and handed to the
//! translator.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use verba_audio::PumpChunk;
use verba_foundation::CancellationToken;
use verba_render::{ResultStore, Sentence};
use verba_stt::{
    remove_repetitions, AudioInput, HallucinationFilter, ModelHandle, TranscribeOptions,
    WhisperResult,
};
use verba_telemetry::{PipelineMetrics, PipelineStage};

use crate::buffer::{BreakReason, UtteranceBuffer};

/// One finished utterance headed for the translator.
#[derive(Debug, Clone)]
pub struct TranslateJob {
    pub utterance_id: u64,
    pub samples: Vec<i16>,
    pub result: WhisperResult,
}

pub struct SchedulerConfig {
    /// Tick period, clamped elsewhere to 1..=1000 ms (default 300).
    pub tick: Duration,
    pub options: TranscribeOptions,
    /// Break the buffer on sustained silence even when it is empty.
    pub auto_break: bool,
    /// Near-duplicate segments allowed before repetition removal kicks in.
    /// Zero disables removal.
    pub repetition_allowed: usize,
    pub filter: HallucinationFilter,
    /// Whether a silence-triggered break still queues the translation.
    pub commit_translation_on_silence_break: bool,
}

pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: SchedulerConfig,
        mut chunks: mpsc::Receiver<PumpChunk>,
        mut buffer: UtteranceBuffer,
        model: Arc<ModelHandle>,
        store: Arc<Mutex<ResultStore>>,
        translate_tx: Option<mpsc::Sender<TranslateJob>>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            metrics.mark_stage_active(PipelineStage::Scheduler);
            let mut interval = tokio::time::interval(config.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut pending: Option<WhisperResult> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                metrics.scheduler_ticks.fetch_add(1, Ordering::Relaxed);

                while let Ok(chunk) = chunks.try_recv() {
                    buffer.push(&chunk);
                }

                if buffer.is_empty() {
                    // Nothing to transcribe; a long-enough silence still
                    // finalizes whatever is pending
                    if config.auto_break && buffer.should_break() == Some(BreakReason::Silence) {
                        let samples = buffer.take();
                        commit_pending(
                            &mut pending,
                            samples,
                            BreakReason::Silence,
                            &config,
                            &store,
                            &translate_tx,
                        )
                        .await;
                    }
                    continue;
                }

                let snapshot = buffer.snapshot();
                let audio = AudioInput::from_i16(&snapshot);
                match model.transcribe(&audio, &config.options).await {
                    Ok(mut result) => {
                        let language = result
                            .language
                            .clone()
                            .or_else(|| config.options.language.clone())
                            .unwrap_or_else(|| "english".to_string());
                        let removed = config.filter.apply(&mut result, &language)
                            + remove_repetitions(&mut result, config.repetition_allowed);
                        if removed > 0 {
                            metrics
                                .filtered_segments
                                .fetch_add(removed as u64, Ordering::Relaxed);
                        }
                        metrics.transcriptions.fetch_add(1, Ordering::Relaxed);
                        store
                            .lock()
                            .set_pending(Some(Sentence::Structured(result.clone())), None);
                        pending = Some(result);
                    }
                    Err(e) => {
                        // Discard this snapshot's result; the next tick
                        // retries with more audio
                        metrics.transcribe_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Transcription failed, keeping buffer: {}", e);
                    }
                }

                if let Some(reason) = buffer.should_break() {
                    let samples = buffer.take();
                    commit_pending(
                        &mut pending,
                        samples,
                        reason,
                        &config,
                        &store,
                        &translate_tx,
                    )
                    .await;
                }
            }

            // Final flush so a stopped session keeps its last utterance
            if pending.is_some() {
                let samples = buffer.take();
                commit_pending(
                    &mut pending,
                    samples,
                    BreakReason::MaxDuration,
                    &config,
                    &store,
                    &translate_tx,
                )
                .await;
            }
            debug!("Scheduler stopped");
        });

        Self { handle }
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn commit_pending(
    pending: &mut Option<WhisperResult>,
    samples: Vec<i16>,
    reason: BreakReason,
    config: &SchedulerConfig,
    store: &Arc<Mutex<ResultStore>>,
    translate_tx: &Option<mpsc::Sender<TranslateJob>>,
) {
    let Some(result) = pending.take() else {
        return;
    };
    let utterance_id = store.lock().commit(Sentence::Structured(result.clone()));
    info!(
        utterance_id,
        ?reason,
        "Utterance committed: {:?}",
        result.text
    );

    let skip_translation =
        reason == BreakReason::Silence && !config.commit_translation_on_silence_break;
    if let Some(tx) = translate_tx {
        if !skip_translation {
            let job = TranslateJob {
                utterance_id,
                samples,
                result,
            };
            if tx.send(job).await.is_err() {
                warn!("Translator queue closed; dropping job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use verba_foundation::TestClock;
    use verba_stt::{Backend, MockConfig, MockEngine, ModelSpec};

    fn test_model(engine: MockEngine) -> Arc<ModelHandle> {
        let dir = std::env::temp_dir();
        let spec = ModelSpec::resolve("base", Backend::Primary, &dir).unwrap();
        Arc::new(ModelHandle::new(spec, Box::new(engine)))
    }

    fn speech_chunk() -> PumpChunk {
        PumpChunk {
            samples: vec![500; 1600],
            speech: true,
            level_db: -20.0,
            captured_at: Instant::now(),
        }
    }

    fn silence_chunk() -> PumpChunk {
        PumpChunk {
            samples: vec![0; 1600],
            speech: false,
            level_db: 0.0,
            captured_at: Instant::now(),
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_millis(10),
            options: TranscribeOptions::default(),
            auto_break: true,
            repetition_allowed: 0,
            filter: HallucinationFilter::empty(),
            commit_translation_on_silence_break: true,
        }
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transcription_is_published_as_pending() {
        let (tx, rx) = mpsc::channel(16);
        let clock = Arc::new(TestClock::new());
        let buffer = UtteranceBuffer::new(Duration::from_secs(30), false, clock);
        let store = Arc::new(Mutex::new(ResultStore::new(10)));
        let cancel = CancellationToken::new();
        let model = test_model(MockEngine::with_transcription("hello there"));

        let scheduler = Scheduler::spawn(
            config(),
            rx,
            buffer,
            model,
            store.clone(),
            None,
            Arc::new(PipelineMetrics::default()),
            cancel.clone(),
        );

        tx.send(speech_chunk()).await.unwrap();
        wait_until(|| store.lock().pending_tc().is_some()).await;
        assert_eq!(
            store.lock().pending_tc().unwrap().text(),
            "hello there"
        );

        cancel.cancel();
        scheduler.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silence_break_commits_and_queues_translation() {
        let (tx, rx) = mpsc::channel(16);
        let clock = Arc::new(TestClock::new());
        let buffer = UtteranceBuffer::new(Duration::from_secs(30), true, clock.clone());
        let store = Arc::new(Mutex::new(ResultStore::new(10)));
        let cancel = CancellationToken::new();
        let model = test_model(MockEngine::with_transcription("finished sentence"));
        let (job_tx, mut job_rx) = mpsc::channel(4);

        let scheduler = Scheduler::spawn(
            config(),
            rx,
            buffer,
            model,
            store.clone(),
            Some(job_tx),
            Arc::new(PipelineMetrics::default()),
            cancel.clone(),
        );

        tx.send(speech_chunk()).await.unwrap();
        wait_until(|| store.lock().pending_tc().is_some()).await;

        tx.send(silence_chunk()).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let job = tokio::time::timeout(Duration::from_secs(5), job_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.utterance_id, 0);
        assert_eq!(job.result.text, "finished sentence");

        let guard = store.lock();
        assert_eq!(guard.tc_sentences().count(), 1);
        assert!(guard.pending_tc().is_none());
        drop(guard);

        cancel.cancel();
        scheduler.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transcribe_failure_keeps_pipeline_alive() {
        let (tx, rx) = mpsc::channel(16);
        let clock = Arc::new(TestClock::new());
        let buffer = UtteranceBuffer::new(Duration::from_secs(30), false, clock);
        let store = Arc::new(Mutex::new(ResultStore::new(10)));
        let cancel = CancellationToken::new();
        let metrics = Arc::new(PipelineMetrics::default());
        let model = test_model(MockEngine::new(MockConfig {
            fail_after_calls: Some(0),
            ..Default::default()
        }));

        let scheduler = Scheduler::spawn(
            config(),
            rx,
            buffer,
            model,
            store.clone(),
            None,
            metrics.clone(),
            cancel.clone(),
        );

        tx.send(speech_chunk()).await.unwrap();
        wait_until(|| metrics.transcribe_errors.load(Ordering::Relaxed) >= 2).await;
        assert!(store.lock().pending_tc().is_none());

        cancel.cancel();
        scheduler.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_stops_the_scheduler_and_flushes() {
        let (tx, rx) = mpsc::channel(16);
        let clock = Arc::new(TestClock::new());
        let buffer = UtteranceBuffer::new(Duration::from_secs(30), false, clock);
        let store = Arc::new(Mutex::new(ResultStore::new(10)));
        let cancel = CancellationToken::new();
        let model = test_model(MockEngine::with_transcription("last words"));

        let scheduler = Scheduler::spawn(
            config(),
            rx,
            buffer,
            model,
            store.clone(),
            None,
            Arc::new(PipelineMetrics::default()),
            cancel.clone(),
        );

        tx.send(speech_chunk()).await.unwrap();
        wait_until(|| store.lock().pending_tc().is_some()).await;

        cancel.cancel();
        scheduler.join().await;
        assert_eq!(store.lock().tc_sentences().count(), 1);
    }
}
