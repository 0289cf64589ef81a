use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::device::{AudioDeviceSpec, DeviceProbe, StreamParams};
use crate::ring_buffer::AudioProducer;
use crate::watchdog::WatchdogTimer;
use verba_foundation::error::AudioError;

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub buffers_captured: AtomicU64,
    pub buffers_dropped: AtomicU64,
    pub restarts: AtomicU64,
    pub last_buffer_time: RwLock<Option<Instant>>,
}

/// Handle to the dedicated capture thread. The cpal callback writes raw
/// interleaved samples at the negotiated device rate into the ring buffer;
/// downmix and resampling happen in the frame pump.
pub struct CaptureThread {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    pub stats: Arc<CaptureStats>,
}

impl CaptureThread {
    pub fn spawn(
        spec: AudioDeviceSpec,
        params: StreamParams,
        producer: AudioProducer,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = running.clone();
        let stats = Arc::new(CaptureStats::default());
        let stats_thread = stats.clone();
        let startup: Arc<RwLock<Option<Result<(), AudioError>>>> = Arc::new(RwLock::new(None));
        let startup_thread = startup.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let mut capture =
                    CaptureWorker::new(spec, params, producer, running.clone(), stats_thread);

                match capture.start() {
                    Ok(()) => *startup_thread.write() = Some(Ok(())),
                    Err(e) => {
                        *startup_thread.write() = Some(Err(e));
                        return;
                    }
                }

                // Watchdog or stream-error driven restarts until shutdown
                while running.load(Ordering::SeqCst) {
                    if capture.watchdog.is_triggered()
                        || capture.restart_needed.load(Ordering::SeqCst)
                    {
                        tracing::warn!("Capture restart triggered (watchdog or stream error)");
                        capture.stop_stream();
                        capture.restart_needed.store(false, Ordering::SeqCst);
                        capture.stats.restarts.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = capture.start() {
                            tracing::error!("Failed to restart capture: {}", e);
                            thread::sleep(Duration::from_millis(500));
                        }
                    }
                    thread::sleep(Duration::from_millis(100));
                }

                tracing::info!("Audio capture thread shutting down");
                capture.stop_stream();
            })
            .map_err(|e| AudioError::Processing(format!("failed to spawn capture thread: {}", e)))?;

        // Surface stream-open failures to the caller instead of leaving a
        // silent dead thread behind.
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            if let Some(result) = startup.write().take() {
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        let _ = handle.join();
                        return Err(e);
                    }
                }
            }
            if Instant::now() > deadline {
                shutdown.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::NoDataTimeout {
                    duration: Duration::from_secs(3),
                });
            }
            thread::sleep(Duration::from_millis(20));
        }

        Ok(Self {
            handle,
            shutdown,
            stats,
        })
    }

    pub fn stop(self) {
        self.shutdown.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

struct CaptureWorker {
    spec: AudioDeviceSpec,
    params: StreamParams,
    producer: Arc<Mutex<AudioProducer>>,
    stream: Option<Stream>,
    watchdog: WatchdogTimer,
    running: Arc<AtomicBool>,
    restart_needed: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
}

impl CaptureWorker {
    fn new(
        spec: AudioDeviceSpec,
        params: StreamParams,
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        stats: Arc<CaptureStats>,
    ) -> Self {
        Self {
            spec,
            params,
            producer: Arc::new(Mutex::new(producer)),
            stream: None,
            watchdog: WatchdogTimer::new(Duration::from_secs(5)),
            running,
            restart_needed: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let probe = if self.spec.host_api == DeviceProbe::default_host_api() {
            DeviceProbe::new()?
        } else {
            DeviceProbe::with_host_api(&self.spec.host_api)?
        };
        let device = probe.open(&self.spec)?;

        let sample_format = device
            .default_input_config()
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::I16);
        let config = StreamConfig {
            channels: self.params.channels,
            sample_rate: cpal::SampleRate(self.params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::info!(
            "Opening capture stream: device='{}' rate={} channels={} format={:?}",
            self.spec.name,
            self.params.sample_rate,
            self.params.channels,
            sample_format
        );

        let stream = self.build_stream(device, config, sample_format)?;
        stream.play()?;
        self.stream = Some(stream);
        self.watchdog.start(Arc::clone(&self.running));
        Ok(())
    }

    fn build_stream(
        &mut self,
        device: cpal::Device,
        config: StreamConfig,
        sample_format: SampleFormat,
    ) -> Result<Stream, AudioError> {
        let producer = Arc::clone(&self.producer);
        let stats = Arc::clone(&self.stats);
        let watchdog = self.watchdog.clone();
        let running = Arc::clone(&self.running);
        let restart_needed = Arc::clone(&self.restart_needed);

        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("Audio stream error: {}", err);
            restart_needed.store(true, Ordering::SeqCst);
        };

        let handle_i16 = move |data: &[i16]| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            watchdog.feed();
            if producer.lock().write(data).is_ok() {
                stats.buffers_captured.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.buffers_dropped.fetch_add(1, Ordering::Relaxed);
            }
            *stats.last_buffer_time.write() = Some(Instant::now());
        };

        // Reuse one conversion buffer per callback thread
        thread_local! {
            static CONVERT_BUFFER: std::cell::RefCell<Vec<i16>> =
                const { std::cell::RefCell::new(Vec::new()) };
        }

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| handle_i16(data),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &_| {
                    CONVERT_BUFFER.with(|buf| {
                        let mut converted = buf.borrow_mut();
                        converted.clear();
                        converted.reserve(data.len());
                        for &s in data {
                            converted.push((s as i32 - 32768) as i16);
                        }
                        handle_i16(&converted);
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| {
                    CONVERT_BUFFER.with(|buf| {
                        let mut converted = buf.borrow_mut();
                        converted.clear();
                        converted.reserve(data.len());
                        for &s in data {
                            let clamped = s.clamp(-1.0, 1.0);
                            converted.push((clamped * 32767.0).round() as i16);
                        }
                        handle_i16(&converted);
                    });
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(AudioError::FormatNotSupported {
                    format: format!("{:?}", other),
                });
            }
        };

        Ok(stream)
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.watchdog.stop();
    }
}

#[cfg(test)]
mod convert_tests {
    #[test]
    fn f32_to_i16_endpoints() {
        let src = [-1.0f32, -0.5, 0.0, 0.5, 1.0];
        let expected = [-32767i16, -16384, 0, 16384, 32767];
        for (s, e) in src.iter().zip(expected.iter()) {
            let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            assert_eq!(v, *e);
        }
    }

    #[test]
    fn u16_to_i16_centering() {
        assert_eq!((0u16 as i32 - 32768) as i16, -32768);
        assert_eq!((32768u16 as i32 - 32768) as i16, 0);
        assert_eq!((65535u16 as i32 - 32768) as i16, 32767);
    }
}
