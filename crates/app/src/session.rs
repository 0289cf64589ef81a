//! Live capture session: device to result store, end to end.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use verba_audio::{
    AudioRingBuffer, CaptureThread, DeviceProbe, FramePump, FramePumpConfig, FrameReader,
    GatePolicy, LevelMeter, StreamRequest,
};
use verba_export::{formats, ExportTask, TemplateContext};
use verba_foundation::error::AppError;
use verba_foundation::{real_clock, CancellationToken, SessionEvent, SessionStateMachine};
use verba_render::{ResultStore, Sentence};
use verba_stt::{HallucinationFilter, ModelHandle, TranscribeOptions};
use verba_telemetry::PipelineMetrics;
use verba_vad::{Aggressiveness, EnergyVad, VadConfig};

use crate::buffer::UtteranceBuffer;
use crate::dispatcher::{Dispatcher, TranslatePath};
use crate::display::LiveDisplay;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::settings::{DeviceSettings, Settings};

const FRAME_QUEUE_DEPTH: usize = 200;
const RING_CAPACITY: usize = 16_384 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Mic,
    Speaker,
}

pub struct SessionConfig {
    pub input: InputKind,
    pub options: TranscribeOptions,
    pub filter: HallucinationFilter,
    pub repetition_allowed: usize,
    /// None disables the translation leg.
    pub translate: Option<TranslatePath>,
    /// Transcript written when the session ends, if set.
    pub transcript_dir: Option<PathBuf>,
    pub export: Option<ExportTask>,
}

fn gate_for(device: &DeviceSettings) -> Result<GatePolicy, AppError> {
    if !device.threshold_enable {
        return Ok(GatePolicy::Disabled);
    }
    if device.threshold_auto {
        let aggressiveness = Aggressiveness::try_from(device.threshold_auto_mode)
            .map_err(AppError::Config)?;
        let config = VadConfig {
            aggressiveness,
            ..Default::default()
        };
        return Ok(GatePolicy::Auto {
            engine: Box::new(EnergyVad::new(config)),
        });
    }
    Ok(GatePolicy::Manual {
        threshold_db: device.threshold_db,
    })
}

fn scheduler_config(
    settings: &Settings,
    config: &SessionConfig,
    device: &DeviceSettings,
) -> SchedulerConfig {
    SchedulerConfig {
        tick: Duration::from_millis(settings.transcribe_rate),
        options: config.options.clone(),
        auto_break: device.auto_break_buffer,
        repetition_allowed: config.repetition_allowed,
        filter: config.filter.clone(),
        commit_translation_on_silence_break: settings.commit_translation_on_silence_break,
    }
}

/// Run a live session until the cancellation token fires.
pub async fn run(
    settings: &Settings,
    config: SessionConfig,
    model: Arc<ModelHandle>,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let state = SessionStateMachine::new();
    state.apply(SessionEvent::Start)?;

    let device = match config.input {
        InputKind::Mic => settings.mic(),
        InputKind::Speaker => settings.speaker(),
    };
    let metrics = Arc::new(PipelineMetrics::default());

    let probe = DeviceProbe::new()?;
    let spec = match config.input {
        InputKind::Mic => probe.default_input()?,
        InputKind::Speaker => probe.default_output()?,
    };
    let request = StreamRequest {
        sample_rate: device.sample_rate,
        channels: device.channels,
        chunk_size: Some(device.chunk_size),
    };
    let params = probe.negotiate(&spec, &request)?;
    info!(
        "Capturing {:?} '{}' at {} Hz, {} ch, chunk {}",
        spec.kind, spec.name, params.sample_rate, params.channels, params.chunk_size
    );

    let (producer, consumer) = AudioRingBuffer::new(RING_CAPACITY).split();
    let capture = CaptureThread::spawn(spec, params, producer)?;
    let reader = FrameReader::new(consumer, params.chunk_size, params.channels);

    let gate = gate_for(&device)?;
    let meter = LevelMeter::new(metrics.level_envelope.clone());
    let (pump, chunks) = FramePump::spawn(
        FramePumpConfig {
            device_sample_rate: params.sample_rate,
            channels: params.channels,
            chunk_size: params.chunk_size,
            queue_depth: FRAME_QUEUE_DEPTH,
        },
        reader,
        gate,
        meter,
        metrics.clone(),
    );

    let buffer = UtteranceBuffer::new(
        Duration::from_secs_f32(device.max_buffer_secs),
        device.auto_break_buffer,
        real_clock(),
    );
    let store = Arc::new(Mutex::new(ResultStore::new(device.max_sentences)));
    let sched_config = scheduler_config(settings, &config, &device);

    let (dispatcher, translate_tx) = match config.translate {
        Some(path) => {
            let (tx, rx) = mpsc::channel(16);
            let dispatcher = Dispatcher::spawn(
                path,
                rx,
                store.clone(),
                metrics.clone(),
                cancel.clone(),
            );
            (Some(dispatcher), Some(tx))
        }
        None => (None, None),
    };

    let scheduler = Scheduler::spawn(
        sched_config,
        chunks,
        buffer,
        model,
        store.clone(),
        translate_tx,
        metrics.clone(),
        cancel.clone(),
    );

    state.apply(SessionEvent::Loaded)?;

    let mut display = LiveDisplay::new(settings);
    let mut stdout = std::io::stdout();
    let mut refresh = tokio::time::interval(Duration::from_millis(200));
    let mut status = tokio::time::interval(Duration::from_secs(30));
    status.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = refresh.tick() => {
                let _ = display.poll(&store.lock(), &mut stdout);
            }
            _ = status.tick() => {
                info!(
                    "chunks={} gated={} dropped={} transcriptions={} translations={} level={:.1} dB",
                    metrics.pump_chunks.load(Ordering::Relaxed),
                    metrics.gated_chunks.load(Ordering::Relaxed),
                    metrics.dropped_chunks.load(Ordering::Relaxed),
                    metrics.transcriptions.load(Ordering::Relaxed),
                    metrics.translations.load(Ordering::Relaxed),
                    metrics.current_level_db(),
                );
            }
        }
    }

    state.apply(SessionEvent::Stop)?;
    pump.stop().await;
    scheduler.join().await;
    if let Some(dispatcher) = dispatcher {
        dispatcher.join().await;
    }
    capture.stop();
    // Final flush picks up utterances committed during shutdown
    let _ = display.poll(&store.lock(), &mut stdout);

    write_transcript(&config.transcript_dir, &config.export, &store)?;
    state.apply(SessionEvent::Stopped)?;
    info!("Session finished");
    Ok(())
}

/// Plain-text transcript of the committed utterances, plus the configured
/// export formats when an export task is set.
fn write_transcript(
    dir: &Option<PathBuf>,
    export: &Option<ExportTask>,
    store: &Arc<Mutex<ResultStore>>,
) -> Result<(), AppError> {
    let Some(dir) = dir else {
        return Ok(());
    };
    let guard = store.lock();
    let lines: Vec<String> = guard
        .tc_sentences()
        .map(|e| e.sentence.text().to_string())
        .collect();
    if lines.is_empty() {
        return Ok(());
    }

    let path = formats::unique_path(dir, "session", "txt");
    formats::write_atomic(&path, &format!("{}\n", lines.join("\n")))?;
    info!("Transcript written to {}", path.display());

    if let Some(export) = export {
        for entry in guard.tc_sentences() {
            if let Sentence::Structured(result) = &entry.sentence {
                let context = TemplateContext {
                    file: format!("session_{}", entry.utterance_id),
                    ..Default::default()
                };
                export.export(result, &context)?;
            }
        }
    }
    Ok(())
}
