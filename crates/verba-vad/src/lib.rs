pub mod config;
pub mod constants;
pub mod energy;
pub mod engine;

pub use config::{Aggressiveness, VadConfig};
pub use constants::{frame_duration_for_chunk, frame_size_samples, SAMPLE_RATE_HZ};
pub use engine::{EnergyVad, VadEngine};
