//! Rolling utterance buffer between the frame pump and the scheduler.

use std::time::{Duration, Instant};

use verba_audio::{PumpChunk, TARGET_SAMPLE_RATE};
use verba_foundation::SharedClock;

/// Silence must persist this long before a break-on-silence fires.
pub const SILENCE_BREAK: Duration = Duration::from_secs(1);

/// Why the current utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    MaxDuration,
    Silence,
}

/// Accumulates gated speech chunks into the current utterance's PCM blob.
/// Single writer (the scheduler task); snapshots are copy-on-read.
pub struct UtteranceBuffer {
    samples: Vec<i16>,
    max_duration: Duration,
    break_on_silence: bool,
    silence_since: Option<Instant>,
    clock: SharedClock,
}

impl UtteranceBuffer {
    pub fn new(max_duration: Duration, break_on_silence: bool, clock: SharedClock) -> Self {
        Self {
            samples: Vec::new(),
            max_duration,
            break_on_silence,
            silence_since: None,
            clock,
        }
    }

    /// Append a pump chunk. Speech extends the utterance; silence only
    /// starts (or continues) the silence window.
    pub fn push(&mut self, chunk: &PumpChunk) {
        if chunk.speech {
            self.samples.extend_from_slice(&chunk.samples);
            self.silence_since = None;
        } else if self.silence_since.is_none() {
            self.silence_since = Some(self.clock.now());
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / TARGET_SAMPLE_RATE as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy-on-read snapshot for the scheduler tick.
    pub fn snapshot(&self) -> Vec<i16> {
        self.samples.clone()
    }

    pub fn silence_elapsed(&self) -> Option<Duration> {
        self.silence_since
            .map(|since| self.clock.now().saturating_duration_since(since))
    }

    /// Break policy: max duration exceeded, or silence persisted past the
    /// break window while break-on-silence is enabled.
    pub fn should_break(&self) -> Option<BreakReason> {
        if self.duration() > self.max_duration {
            return Some(BreakReason::MaxDuration);
        }
        if self.break_on_silence
            && self
                .silence_elapsed()
                .is_some_and(|elapsed| elapsed >= SILENCE_BREAK)
        {
            return Some(BreakReason::Silence);
        }
        None
    }

    /// Reset for the next utterance. Returns the finished PCM.
    pub fn take(&mut self) -> Vec<i16> {
        self.silence_since = None;
        std::mem::take(&mut self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use verba_foundation::TestClock;

    fn chunk(samples: usize, speech: bool) -> PumpChunk {
        PumpChunk {
            samples: vec![100; samples],
            speech,
            level_db: if speech { -20.0 } else { 0.0 },
            captured_at: Instant::now(),
        }
    }

    fn buffer_with_clock(max_secs: u64, break_on_silence: bool) -> (UtteranceBuffer, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let buffer = UtteranceBuffer::new(
            Duration::from_secs(max_secs),
            break_on_silence,
            clock.clone(),
        );
        (buffer, clock)
    }

    #[test]
    fn speech_accumulates_silence_does_not() {
        let (mut buffer, _clock) = buffer_with_clock(10, false);
        buffer.push(&chunk(1600, true));
        buffer.push(&chunk(1600, false));
        buffer.push(&chunk(1600, true));
        assert_eq!(buffer.duration(), Duration::from_millis(200));
    }

    #[test]
    fn max_duration_triggers_break() {
        let (mut buffer, _clock) = buffer_with_clock(1, false);
        // 1.1 s of speech at 16 kHz
        buffer.push(&chunk(17_600, true));
        assert_eq!(buffer.should_break(), Some(BreakReason::MaxDuration));
        assert_eq!(buffer.take().len(), 17_600);
        assert!(buffer.is_empty());
        assert!(buffer.should_break().is_none());
    }

    #[test]
    fn silence_break_needs_a_full_second() {
        let (mut buffer, clock) = buffer_with_clock(30, true);
        buffer.push(&chunk(1600, true));
        buffer.push(&chunk(1600, false));
        assert!(buffer.should_break().is_none());

        clock.advance(Duration::from_millis(999));
        assert!(buffer.should_break().is_none());
        clock.advance(Duration::from_millis(1));
        assert_eq!(buffer.should_break(), Some(BreakReason::Silence));
    }

    #[test]
    fn speech_resets_the_silence_window() {
        let (mut buffer, clock) = buffer_with_clock(30, true);
        buffer.push(&chunk(1600, false));
        clock.advance(Duration::from_millis(900));
        buffer.push(&chunk(1600, true));
        clock.advance(Duration::from_millis(200));
        assert!(buffer.should_break().is_none());
    }

    #[test]
    fn silence_break_disabled_never_fires() {
        let (mut buffer, clock) = buffer_with_clock(30, false);
        buffer.push(&chunk(1600, false));
        clock.advance(Duration::from_secs(60));
        assert!(buffer.should_break().is_none());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let (mut buffer, _clock) = buffer_with_clock(10, false);
        buffer.push(&chunk(1600, true));
        let snap = buffer.snapshot();
        assert_eq!(snap.len(), 1600);
        assert!(!buffer.is_empty());
    }
}
