use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::device::TARGET_SAMPLE_RATE;
use crate::frame_reader::FrameReader;
use crate::meter::LevelMeter;
use crate::resampler::{downmix_to_mono, StreamResampler};
use verba_telemetry::{PipelineMetrics, PipelineStage};
use verba_vad::VadEngine;

/// How a chunk is judged speech or silence before it reaches the
/// utterance buffer.
pub enum GatePolicy {
    /// Every chunk passes as speech; silence breaks never fire.
    Disabled,
    /// Level gate on the chunk's own dB RMS. The 0.0 sentinel for silent
    /// chunks always fails the threshold.
    Manual { threshold_db: f32 },
    /// Voice activity detection on the first sub-frame of each chunk.
    Auto { engine: Box<dyn VadEngine> },
}

/// One gated chunk of 16 kHz mono PCM leaving the pump.
#[derive(Debug, Clone)]
pub struct PumpChunk {
    pub samples: Vec<i16>,
    pub speech: bool,
    pub level_db: f32,
    pub captured_at: Instant,
}

impl PumpChunk {
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / TARGET_SAMPLE_RATE as u64)
    }
}

/// Drives capture output through downmix, resample, metering, and gating,
/// and feeds the utterance buffer through a bounded queue.
pub struct FramePump {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

pub struct FramePumpConfig {
    pub device_sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
    pub queue_depth: usize,
}

impl FramePump {
    pub fn spawn(
        config: FramePumpConfig,
        mut reader: FrameReader,
        mut gate: GatePolicy,
        meter: LevelMeter,
        metrics: Arc<PipelineMetrics>,
    ) -> (Self, mpsc::Receiver<PumpChunk>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let running_task = running.clone();
        let paused_task = paused.clone();

        // Poll at half the chunk period so the ring buffer never backs up
        let chunk_period = Duration::from_micros(
            config.chunk_size as u64 * 1_000_000 / config.device_sample_rate as u64,
        );
        let poll_interval = (chunk_period / 2).max(Duration::from_millis(2));

        let handle = tokio::spawn(async move {
            let mut resampler =
                match StreamResampler::new(config.device_sample_rate, TARGET_SAMPLE_RATE) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!("Frame pump cannot start: {}", e);
                        return;
                    }
                };

            metrics.mark_stage_active(PipelineStage::Pump);
            let mut last_speech = false;

            while running_task.load(Ordering::Relaxed) {
                let Some(raw) = reader.next_chunk() else {
                    tokio::time::sleep(poll_interval).await;
                    continue;
                };

                if paused_task.load(Ordering::Relaxed) {
                    // Keep draining so the ring buffer does not overflow,
                    // but produce nothing while paused.
                    resampler.reset();
                    if let GatePolicy::Auto { engine } = &mut gate {
                        engine.reset();
                    }
                    last_speech = false;
                    continue;
                }

                let mono = downmix_to_mono(&raw, config.channels);
                let samples = resampler.process(&mono);
                if samples.is_empty() {
                    continue;
                }

                let level_db = meter.measure(&samples);
                metrics.record_level_db(level_db);
                metrics.pump_chunks.fetch_add(1, Ordering::Relaxed);

                let speech = match &mut gate {
                    GatePolicy::Disabled => true,
                    GatePolicy::Manual { threshold_db } => {
                        level_db != 0.0 && level_db > *threshold_db
                    }
                    GatePolicy::Auto { engine } => {
                        let frame_size = engine.required_frame_size_samples();
                        if samples.len() >= frame_size {
                            match engine.is_speech(&samples[..frame_size]) {
                                Ok(v) => v,
                                Err(e) => {
                                    tracing::warn!("VAD error, reusing last decision: {}", e);
                                    last_speech
                                }
                            }
                        } else {
                            last_speech
                        }
                    }
                };
                last_speech = speech;
                metrics.mark_speaking(speech);
                if speech {
                    metrics.gated_chunks.fetch_add(1, Ordering::Relaxed);
                }

                let chunk = PumpChunk {
                    samples,
                    speech,
                    level_db,
                    captured_at: Instant::now(),
                };
                match tx.try_send(chunk) {
                    Ok(()) => {
                        metrics
                            .frame_queue_depth
                            .store(config.queue_depth - tx.capacity(), Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        metrics.dropped_chunks.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Frame queue full; dropping chunk");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            tracing::debug!("Frame pump stopped");
        });

        (
            Self {
                handle,
                running,
                paused,
            },
            rx,
        )
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub async fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::AudioRingBuffer;
    use verba_telemetry::LevelEnvelope;

    fn pump_with_gate(gate: GatePolicy) -> (crate::ring_buffer::AudioProducer, FramePump, mpsc::Receiver<PumpChunk>) {
        let rb = AudioRingBuffer::new(16_384);
        let (producer, consumer) = rb.split();
        let reader = FrameReader::new(consumer, 160, 1);
        let meter = LevelMeter::new(Arc::new(LevelEnvelope::new()));
        let metrics = Arc::new(PipelineMetrics::default());
        let config = FramePumpConfig {
            device_sample_rate: 16_000,
            channels: 1,
            chunk_size: 160,
            queue_depth: 64,
        };
        let (pump, rx) = FramePump::spawn(config, reader, gate, meter, metrics);
        (producer, pump, rx)
    }

    fn loud_chunk() -> Vec<i16> {
        (0..160)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 * 440.0 / 16_000.0;
                (phase.sin() * 12_000.0) as i16
            })
            .collect()
    }

    #[tokio::test]
    async fn disabled_gate_marks_everything_speech() {
        let (mut producer, pump, mut rx) = pump_with_gate(GatePolicy::Disabled);
        producer.write(&[0i16; 160]).unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(chunk.speech);
        assert_eq!(chunk.level_db, 0.0);
        pump.stop().await;
    }

    #[tokio::test]
    async fn manual_gate_blocks_quiet_chunks() {
        let (mut producer, pump, mut rx) =
            pump_with_gate(GatePolicy::Manual { threshold_db: -20.0 });
        producer.write(&[10i16; 160]).unwrap();
        producer.write(&loud_chunk()).unwrap();

        let quiet = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!quiet.speech);

        let loud = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(loud.speech);
        pump.stop().await;
    }

    #[tokio::test]
    async fn silent_sentinel_fails_any_manual_threshold() {
        // threshold below any real level: sentinel 0.0 would pass a naive
        // numeric comparison, which is exactly the bug the gate must avoid
        let (mut producer, pump, mut rx) =
            pump_with_gate(GatePolicy::Manual { threshold_db: -90.0 });
        producer.write(&[0i16; 160]).unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!chunk.speech);
        pump.stop().await;
    }

    #[tokio::test]
    async fn paused_pump_produces_nothing() {
        let (mut producer, pump, mut rx) = pump_with_gate(GatePolicy::Disabled);
        pump.pause();
        producer.write(&loud_chunk()).unwrap();

        let got = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(got.is_err());

        pump.resume();
        producer.write(&loud_chunk()).unwrap();
        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(chunk.speech);
        pump.stop().await;
    }

    #[test]
    fn chunk_duration_matches_sample_count() {
        let chunk = PumpChunk {
            samples: vec![0; 1600],
            speech: false,
            level_db: 0.0,
            captured_at: Instant::now(),
        };
        assert_eq!(chunk.duration(), Duration::from_millis(100));
    }
}
