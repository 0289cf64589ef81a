//! dB RMS level meter for the frame pump.
//!
//! Levels are expressed relative to full-scale PCM16 (32767):
//! `20 * log10(rms / 32767)`. A frame whose RMS is exactly zero reports
//! 0.0 dB as the "silent/zero" sentinel, which callers must treat as
//! no-signal rather than full-scale.

use verba_telemetry::LevelEnvelope;

pub struct LevelMeter {
    envelope: std::sync::Arc<LevelEnvelope>,
}

impl LevelMeter {
    pub fn new(envelope: std::sync::Arc<LevelEnvelope>) -> Self {
        Self { envelope }
    }

    /// Compute the frame's dB level and feed the envelope trackers.
    pub fn measure(&self, samples: &[i16]) -> f32 {
        let db = db_rms(samples);
        if db != 0.0 {
            self.envelope.update(db);
        }
        db
    }
}

/// RMS of PCM16 samples.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: i64 = samples
        .iter()
        .map(|&s| {
            let v = s as i64;
            v * v
        })
        .sum();
    (sum_squares as f64 / samples.len() as f64).sqrt()
}

/// dB relative to full scale, with the 0.0 sentinel for silent frames.
pub fn db_rms(samples: &[i16]) -> f32 {
    let rms = rms(samples);
    if rms == 0.0 {
        return 0.0;
    }
    (20.0 * (rms / 32767.0).log10()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frame_reports_sentinel() {
        assert_eq!(db_rms(&[0i16; 160]), 0.0);
        assert_eq!(db_rms(&[]), 0.0);
    }

    #[test]
    fn full_scale_is_near_zero_db() {
        let db = db_rms(&[32767i16; 160]);
        assert!(db.abs() < 0.01);
    }

    #[test]
    fn sine_at_half_scale() {
        let sine: Vec<i16> = (0..1600)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 * 440.0 / 16_000.0;
                (phase.sin() * 16384.0) as i16
            })
            .collect();
        // Half-scale sine: 20*log10(0.5/sqrt(2)) = about -9.0 dB
        let db = db_rms(&sine);
        assert!((db - -9.0).abs() < 0.5, "got {}", db);
    }

    #[test]
    fn envelope_skips_sentinel_frames() {
        let envelope = std::sync::Arc::new(LevelEnvelope::new());
        let meter = LevelMeter::new(envelope.clone());

        meter.measure(&[0i16; 160]);
        assert_eq!(envelope.max_db(), None);

        meter.measure(&[8000i16; 160]);
        assert!(envelope.max_db().is_some());
    }
}
