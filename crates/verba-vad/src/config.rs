use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FRAME_DURATION_MS, SAMPLE_RATE_HZ};

/// Aggressiveness of the speech detector, 1 (permissive) to 3 (strict).
/// Maps onto the onset margin above the adapted noise floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Aggressiveness {
    Low,
    Medium,
    High,
}

impl TryFrom<u8> for Aggressiveness {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(format!("aggressiveness must be 1..=3, got {}", other)),
        }
    }
}

impl From<Aggressiveness> for u8 {
    fn from(value: Aggressiveness) -> u8 {
        match value {
            Aggressiveness::Low => 1,
            Aggressiveness::Medium => 2,
            Aggressiveness::High => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    pub aggressiveness: Aggressiveness,
    pub frame_duration_ms: u32,
    pub sample_rate_hz: u32,
    /// Starting estimate for the noise floor before adaptation kicks in.
    pub initial_floor_db: f32,
    /// EMA coefficient for noise-floor adaptation.
    pub ema_alpha: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: Aggressiveness::Medium,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
            sample_rate_hz: SAMPLE_RATE_HZ,
            initial_floor_db: -50.0,
            ema_alpha: 0.02,
        }
    }
}

impl VadConfig {
    /// Onset margin in dB above the noise floor required to call a frame
    /// speech. Stricter settings demand a larger margin.
    pub fn onset_margin_db(&self) -> f32 {
        match self.aggressiveness {
            Aggressiveness::Low => 6.0,
            Aggressiveness::Medium => 9.0,
            Aggressiveness::High => 12.0,
        }
    }

    /// Margin below which a frame is counted as silence again.
    pub fn offset_margin_db(&self) -> f32 {
        self.onset_margin_db() - 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggressiveness_round_trips_through_u8() {
        for v in 1u8..=3 {
            let a = Aggressiveness::try_from(v).unwrap();
            assert_eq!(u8::from(a), v);
        }
        assert!(Aggressiveness::try_from(0).is_err());
        assert!(Aggressiveness::try_from(4).is_err());
    }

    #[test]
    fn margins_scale_with_aggressiveness() {
        let mut cfg = VadConfig::default();
        cfg.aggressiveness = Aggressiveness::Low;
        let low = cfg.onset_margin_db();
        cfg.aggressiveness = Aggressiveness::High;
        assert!(cfg.onset_margin_db() > low);
        assert!(cfg.offset_margin_db() < cfg.onset_margin_db());
    }
}
