use crate::config::VadConfig;
use crate::constants::frame_size_samples;
use crate::energy::EnergyCalculator;

/// A voice activity detector operating on fixed-duration PCM16 frames.
///
/// Implementations are interchangeable inside the frame pump; the gating
/// policy only asks whether one frame is speech.
pub trait VadEngine: Send {
    /// Classify a single frame. The slice length must equal
    /// `required_frame_size_samples()`.
    fn is_speech(&mut self, frame: &[i16]) -> Result<bool, String>;
    fn reset(&mut self);
    fn required_sample_rate(&self) -> u32;
    fn required_frame_size_samples(&self) -> usize;
}

/// Energy detector with an adaptive noise floor.
///
/// The floor tracks non-speech frames with an EMA; a frame is speech when it
/// rises at least the aggressiveness-dependent onset margin above the floor
/// and remains speech until it falls below the (smaller) offset margin.
pub struct EnergyVad {
    config: VadConfig,
    energy: EnergyCalculator,
    noise_floor_db: f32,
    in_speech: bool,
    frame_size: usize,
}

const MIN_FLOOR_DB: f32 = -80.0;
const MAX_FLOOR_DB: f32 = -20.0;

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        let frame_size = frame_size_samples(config.frame_duration_ms, config.sample_rate_hz);
        Self {
            noise_floor_db: config.initial_floor_db.clamp(MIN_FLOOR_DB, MAX_FLOOR_DB),
            in_speech: false,
            energy: EnergyCalculator::new(),
            frame_size,
            config,
        }
    }

    fn onset_threshold(&self) -> f32 {
        self.noise_floor_db + self.config.onset_margin_db()
    }

    fn offset_threshold(&self) -> f32 {
        self.noise_floor_db + self.config.offset_margin_db()
    }

    fn adapt_floor(&mut self, energy_db: f32) {
        if energy_db > MIN_FLOOR_DB && energy_db < MAX_FLOOR_DB {
            let alpha = self.config.ema_alpha;
            self.noise_floor_db = ((1.0 - alpha) * self.noise_floor_db + alpha * energy_db)
                .clamp(MIN_FLOOR_DB, MAX_FLOOR_DB);
        }
    }
}

impl VadEngine for EnergyVad {
    fn is_speech(&mut self, frame: &[i16]) -> Result<bool, String> {
        if frame.len() != self.frame_size {
            return Err(format!(
                "frame size {} does not match required {}",
                frame.len(),
                self.frame_size
            ));
        }

        let energy_db = self.energy.calculate_dbfs(frame);

        self.in_speech = if self.in_speech {
            energy_db >= self.offset_threshold()
        } else {
            energy_db >= self.onset_threshold()
        };

        if !self.in_speech {
            self.adapt_floor(energy_db);
        }

        Ok(self.in_speech)
    }

    fn reset(&mut self) {
        self.noise_floor_db = self.config.initial_floor_db.clamp(MIN_FLOOR_DB, MAX_FLOOR_DB);
        self.in_speech = false;
    }

    fn required_sample_rate(&self) -> u32 {
        self.config.sample_rate_hz
    }

    fn required_frame_size_samples(&self) -> usize {
        self.frame_size
    }
}
