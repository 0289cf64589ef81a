//! Audio file loading for the batch pipelines.
//!
//! WAV files are read directly with hound; everything else is decoded by
//! the `ffmpeg` binary into a temporary 16 kHz mono WAV first. Absence of
//! ffmpeg on PATH disables non-WAV import.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};
use verba_audio::{downmix_to_mono, StreamResampler, TARGET_SAMPLE_RATE};
use verba_foundation::error::AppError;

pub fn ffmpeg_available() -> bool {
    let path = match std::env::var_os("PATH") {
        Some(path) => path,
        None => return false,
    };
    std::env::split_paths(&path).any(|dir| {
        let candidate = dir.join("ffmpeg");
        candidate.is_file() || dir.join("ffmpeg.exe").is_file()
    })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Load any supported media file as 16 kHz mono PCM.
pub fn load_audio(path: &Path) -> Result<Vec<i16>, AppError> {
    if is_wav(path) {
        return load_wav(path);
    }
    if !ffmpeg_available() {
        return Err(AppError::FfmpegMissing);
    }
    let decoded = decode_with_ffmpeg(path)?;
    let samples = load_wav(&decoded);
    let _ = std::fs::remove_file(&decoded);
    samples
}

fn load_wav(path: &Path) -> Result<Vec<i16>, AppError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    debug!(
        "Loading {}: {} Hz, {} ch, {:?} {}-bit",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.sample_format,
        spec.bits_per_sample
    );

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| {
                s.map(|v| {
                    // Scale wider formats down to 16-bit
                    let shift = spec.bits_per_sample.saturating_sub(16);
                    (v >> shift) as i16
                })
            })
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Config(e.to_string()))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Config(e.to_string()))?,
    };

    let mono = downmix_to_mono(&interleaved, spec.channels);
    if spec.sample_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }

    let mut resampler = StreamResampler::new(spec.sample_rate, TARGET_SAMPLE_RATE)
        .map_err(|e| AppError::Audio(e))?;
    let mut out = resampler.process(&mono);
    // Flush the resampler tail with one chunk of silence
    out.extend(resampler.process(&vec![0i16; 1024]));
    Ok(out)
}

fn decode_with_ffmpeg(path: &Path) -> Result<PathBuf, AppError> {
    let out = std::env::temp_dir().join(format!(
        "verba-import-{}.wav",
        std::process::id()
    ));
    info!("Decoding {} via ffmpeg", path.display());
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(path)
        .args(["-ar", "16000", "-ac", "1", "-f", "wav"])
        .arg(&out)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map_err(|e| AppError::Config(format!("ffmpeg: {}", e)))?;
    if !status.success() {
        return Err(AppError::Config(format!(
            "ffmpeg failed decoding {} (status {})",
            path.display(),
            status
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn native_rate_wav_loads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
        write_wav(&path, 16_000, 1, &samples);

        let loaded = load_audio(&path).unwrap();
        assert_eq!(loaded, samples);
    }

    #[test]
    fn stereo_wav_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.wav");
        // L=100, R=300 per frame
        let samples: Vec<i16> = (0..3200).map(|i| if i % 2 == 0 { 100 } else { 300 }).collect();
        write_wav(&path, 16_000, 2, &samples);

        let loaded = load_audio(&path).unwrap();
        assert_eq!(loaded.len(), 1600);
        assert!(loaded.iter().all(|&s| s == 200));
    }

    #[test]
    fn high_rate_wav_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hi.wav");
        let samples: Vec<i16> = vec![1000; 48_000];
        write_wav(&path, 48_000, 1, &samples);

        let loaded = load_audio(&path).unwrap();
        // One second of input lands near 16_000 output samples
        assert!(
            (loaded.len() as i64 - 16_000).unsigned_abs() < 2_000,
            "got {} samples",
            loaded.len()
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_audio(Path::new("/nonexistent/x.wav")).is_err());
    }
}
