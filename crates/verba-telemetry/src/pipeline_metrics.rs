use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics for cross-thread pipeline monitoring.
///
/// All fields are atomics so the capture callback can update them without
/// taking a lock. dB values are stored as `db * 10` in an AtomicI64.
#[derive(Clone)]
pub struct PipelineMetrics {
    // Audio level monitoring
    pub audio_level_db: Arc<AtomicI64>,
    pub level_envelope: Arc<LevelEnvelope>,

    // Pipeline stage tracking
    pub stage_pump: Arc<AtomicBool>,
    pub stage_scheduler: Arc<AtomicBool>,

    // Event counters
    pub pump_chunks: Arc<AtomicU64>,
    pub gated_chunks: Arc<AtomicU64>,
    pub dropped_chunks: Arc<AtomicU64>,
    pub scheduler_ticks: Arc<AtomicU64>,
    pub transcriptions: Arc<AtomicU64>,
    pub translations: Arc<AtomicU64>,
    pub filtered_segments: Arc<AtomicU64>,

    // Queue monitoring
    pub frame_queue_depth: Arc<AtomicUsize>,

    // Activity indicators
    pub is_speaking: Arc<AtomicBool>,
    pub last_speech_time: Arc<RwLock<Option<Instant>>>,

    // Error tracking
    pub transcribe_errors: Arc<AtomicU64>,
    pub translate_errors: Arc<AtomicU64>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            audio_level_db: Arc::new(AtomicI64::new(0)),
            level_envelope: Arc::new(LevelEnvelope::new()),

            stage_pump: Arc::new(AtomicBool::new(false)),
            stage_scheduler: Arc::new(AtomicBool::new(false)),

            pump_chunks: Arc::new(AtomicU64::new(0)),
            gated_chunks: Arc::new(AtomicU64::new(0)),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
            scheduler_ticks: Arc::new(AtomicU64::new(0)),
            transcriptions: Arc::new(AtomicU64::new(0)),
            translations: Arc::new(AtomicU64::new(0)),
            filtered_segments: Arc::new(AtomicU64::new(0)),

            frame_queue_depth: Arc::new(AtomicUsize::new(0)),

            is_speaking: Arc::new(AtomicBool::new(false)),
            last_speech_time: Arc::new(RwLock::new(None)),

            transcribe_errors: Arc::new(AtomicU64::new(0)),
            translate_errors: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl PipelineMetrics {
    pub fn record_level_db(&self, db: f32) {
        self.audio_level_db
            .store((db * 10.0) as i64, Ordering::Relaxed);
        self.level_envelope.update(db);
    }

    pub fn current_level_db(&self) -> f32 {
        self.audio_level_db.load(Ordering::Relaxed) as f32 / 10.0
    }

    pub fn mark_stage_active(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Pump => self.stage_pump.store(true, Ordering::Relaxed),
            PipelineStage::Scheduler => self.stage_scheduler.store(true, Ordering::Relaxed),
        }
    }

    pub fn mark_speaking(&self, speaking: bool) {
        self.is_speaking.store(speaking, Ordering::Relaxed);
        if speaking {
            *self.last_speech_time.write() = Some(Instant::now());
        }
    }
}

/// Worker loops that flag themselves once their first iteration runs.
#[derive(Debug, Clone, Copy)]
pub enum PipelineStage {
    Pump,
    Scheduler,
}

/// Running max/min dB envelope feeding the auto-threshold readout. Values
/// are db * 10 in atomics; `reset()` re-arms the envelope for a new session.
pub struct LevelEnvelope {
    max_db: AtomicI64,
    min_db: AtomicI64,
}

impl Default for LevelEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelEnvelope {
    pub fn new() -> Self {
        Self {
            max_db: AtomicI64::new(i64::MIN),
            min_db: AtomicI64::new(i64::MAX),
        }
    }

    pub fn update(&self, db: f32) {
        let scaled = (db * 10.0) as i64;
        self.max_db.fetch_max(scaled, Ordering::Relaxed);
        self.min_db.fetch_min(scaled, Ordering::Relaxed);
    }

    pub fn max_db(&self) -> Option<f32> {
        let v = self.max_db.load(Ordering::Relaxed);
        (v != i64::MIN).then(|| v as f32 / 10.0)
    }

    pub fn min_db(&self) -> Option<f32> {
        let v = self.min_db.load(Ordering::Relaxed);
        (v != i64::MAX).then(|| v as f32 / 10.0)
    }

    pub fn reset(&self) {
        self.max_db.store(i64::MIN, Ordering::Relaxed);
        self.min_db.store(i64::MAX, Ordering::Relaxed);
    }
}
