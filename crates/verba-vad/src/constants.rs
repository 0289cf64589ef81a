//! Audio constants shared by the gating pipeline.

/// Target sample rate for all VAD processing (Hz).
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Frame durations the detector accepts, in milliseconds.
pub const VALID_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

/// Fallback frame duration when the chunk is shorter than every valid
/// duration.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 10;

/// Mono is the only channel layout the detector sees.
pub const CHANNELS_MONO: u16 = 1;

/// Pick the largest valid frame duration that fits inside one chunk.
///
/// `chunk_size` is in frames at `sample_rate`. With the extremes of the
/// allowed chunk set, 160 frames at 16 kHz (10 ms) selects 10 ms and
/// 1280 frames (80 ms) selects 30 ms.
pub fn frame_duration_for_chunk(chunk_size: usize, sample_rate: u32) -> u32 {
    let ms_per_chunk = chunk_size as u64 * 1000 / sample_rate as u64;
    VALID_FRAME_DURATIONS_MS
        .iter()
        .copied()
        .filter(|&d| d as u64 <= ms_per_chunk)
        .max()
        .unwrap_or(DEFAULT_FRAME_DURATION_MS)
}

/// Number of samples in one VAD frame at the given rate.
pub fn frame_size_samples(frame_duration_ms: u32, sample_rate: u32) -> usize {
    (sample_rate as u64 * frame_duration_ms as u64 / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_extremes_select_expected_durations() {
        // 160 frames at 16kHz = 10ms
        assert_eq!(frame_duration_for_chunk(160, 16_000), 10);
        // 1280 frames at 16kHz = 80ms, largest valid is 30ms
        assert_eq!(frame_duration_for_chunk(1280, 16_000), 30);
    }

    #[test]
    fn intermediate_chunks() {
        assert_eq!(frame_duration_for_chunk(320, 16_000), 20);
        assert_eq!(frame_duration_for_chunk(480, 16_000), 30);
        assert_eq!(frame_duration_for_chunk(640, 16_000), 30);
    }

    #[test]
    fn tiny_chunk_falls_back_to_default() {
        // 80 frames at 16kHz = 5ms, below every valid duration
        assert_eq!(frame_duration_for_chunk(80, 16_000), 10);
    }

    #[test]
    fn frame_sizes() {
        assert_eq!(frame_size_samples(10, 16_000), 160);
        assert_eq!(frame_size_samples(30, 16_000), 480);
    }
}
