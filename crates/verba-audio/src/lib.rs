//! Audio capture and the gated frame pump.
//!
//! The capture callback writes raw interleaved PCM into a lock-free ring
//! buffer on a dedicated OS thread. The frame pump assembles fixed-size
//! chunks, downmixes to mono, resamples to 16 kHz, meters the level, and
//! applies the gating policy before handing chunks to the utterance buffer.

pub mod capture;
pub mod device;
pub mod frame_reader;
pub mod meter;
pub mod pump;
pub mod resampler;
pub mod ring_buffer;
pub mod watchdog;

pub use capture::{CaptureStats, CaptureThread};
pub use device::{
    AudioDeviceSpec, DeviceKind, DeviceProbe, StreamParams, StreamRequest, TARGET_SAMPLE_RATE,
    VALID_CHUNK_SIZES,
};
pub use frame_reader::FrameReader;
pub use meter::{db_rms, rms, LevelMeter};
pub use pump::{FramePump, FramePumpConfig, GatePolicy, PumpChunk};
pub use resampler::{downmix_to_mono, ResamplerQuality, StreamResampler};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
pub use watchdog::WatchdogTimer;
