use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use verba_foundation::error::AudioError;

/// Quality presets for the streaming resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerQuality {
    Fast,
    #[default]
    Balanced,
    Quality,
}

/// Streaming mono i16 resampler built on Rubato's sinc interpolation.
///
/// Accepts arbitrary-sized input chunks, accumulating internally until a
/// full Rubato chunk is available. Same-rate construction is a passthrough.
pub struct StreamResampler {
    in_rate: u32,
    out_rate: u32,
    resampler: Option<SincFixedIn<f32>>,
    input_buffer: Vec<f32>,
    output_buffer: Vec<f32>,
    chunk_size: usize,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self, AudioError> {
        Self::with_quality(in_rate, out_rate, ResamplerQuality::default())
    }

    pub fn with_quality(
        in_rate: u32,
        out_rate: u32,
        quality: ResamplerQuality,
    ) -> Result<Self, AudioError> {
        // 512 samples keeps latency around 32ms at 16kHz
        let chunk_size = 512;

        let resampler = if in_rate == out_rate {
            None
        } else {
            let params = match quality {
                ResamplerQuality::Fast => SincInterpolationParameters {
                    sinc_len: 32,
                    f_cutoff: 0.92,
                    interpolation: SincInterpolationType::Linear,
                    oversampling_factor: 64,
                    window: WindowFunction::Blackman,
                },
                ResamplerQuality::Balanced => SincInterpolationParameters {
                    sinc_len: 64,
                    f_cutoff: 0.95,
                    interpolation: SincInterpolationType::Cubic,
                    oversampling_factor: 128,
                    window: WindowFunction::Blackman2,
                },
                ResamplerQuality::Quality => SincInterpolationParameters {
                    sinc_len: 128,
                    f_cutoff: 0.97,
                    interpolation: SincInterpolationType::Cubic,
                    oversampling_factor: 256,
                    window: WindowFunction::BlackmanHarris2,
                },
            };

            let inner = SincFixedIn::<f32>::new(
                out_rate as f64 / in_rate as f64,
                2.0,
                params,
                chunk_size,
                1,
            )
            .map_err(|e| AudioError::Processing(format!("resampler init: {}", e)))?;
            Some(inner)
        };

        Ok(Self {
            in_rate,
            out_rate,
            resampler,
            input_buffer: Vec::with_capacity(chunk_size * 2),
            output_buffer: Vec::new(),
            chunk_size,
        })
    }

    /// Feed an arbitrary chunk of mono i16 samples; returns whatever
    /// resampled output is available so far.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        let Some(resampler) = self.resampler.as_mut() else {
            return input.to_vec();
        };

        for &sample in input {
            self.input_buffer.push(sample as f32 / 32768.0);
        }

        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            match resampler.process(&[chunk], None) {
                Ok(frames) => {
                    if let Some(mono) = frames.first() {
                        self.output_buffer.extend_from_slice(mono);
                    }
                }
                Err(e) => {
                    tracing::error!("Resampler error: {}", e);
                    return Vec::new();
                }
            }
        }

        let result = self
            .output_buffer
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        self.output_buffer.clear();
        result
    }

    pub fn reset(&mut self) {
        self.input_buffer.clear();
        self.output_buffer.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.out_rate
    }
}

/// Average interleaved multi-channel PCM down to mono.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / ch as i32) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_same_rate() {
        let mut rs = StreamResampler::new(16_000, 16_000).unwrap();
        let input = vec![100i16, 200, 300, 400, 500];
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn downsample_48k_to_16k_ratio() {
        let mut rs = StreamResampler::new(48_000, 16_000).unwrap();
        let input: Vec<i16> = (0..4_800).map(|i| (i % 1000) as i16).collect();

        let mut out = Vec::new();
        for chunk in input.chunks(1000) {
            out.extend(rs.process(chunk));
        }
        assert!(
            out.len() >= 1400 && out.len() <= 1700,
            "expected ~1600 samples, got {}",
            out.len()
        );
    }

    #[test]
    fn upsample_constant_holds_level() {
        let mut rs = StreamResampler::new(16_000, 48_000).unwrap();
        let out = rs.process(&vec![1000i16; 1600]);
        assert!(out.len() >= 4400 && out.len() <= 5000);
        for &s in &out[50..out.len() - 50] {
            assert!((900..=1100).contains(&s), "sample {} drifted", s);
        }
    }

    #[test]
    fn downmix_stereo_averages() {
        let stereo = [100i16, 300, -200, 200, 0, 0];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![200, 0, 0]);
    }

    #[test]
    fn downmix_mono_is_identity() {
        let mono = [1i16, 2, 3];
        assert_eq!(downmix_to_mono(&mono, 1), vec![1, 2, 3]);
    }

    #[test]
    fn quality_presets_construct() {
        for q in [
            ResamplerQuality::Fast,
            ResamplerQuality::Balanced,
            ResamplerQuality::Quality,
        ] {
            assert!(StreamResampler::with_quality(44_100, 16_000, q).is_ok());
        }
    }
}
