//! Transcription result model shared across the pipeline.

use serde::{Deserialize, Serialize};

/// One recognized utterance: detected language plus timestamped segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperResult {
    pub language: Option<String>,
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub avg_logprob: f64,
    #[serde(default)]
    pub compression_ratio: f64,
    #[serde(default)]
    pub no_speech_prob: f64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub tokens: Vec<i64>,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: u32,
    pub segment_id: u32,
    pub start: f64,
    pub end: f64,
    pub word: String,
    pub probability: f64,
}

impl WhisperResult {
    pub fn empty() -> Self {
        Self {
            language: None,
            text: String::new(),
            segments: Vec::new(),
        }
    }

    /// Rebuild the top-level text from segment texts.
    pub fn rebuild_text(&mut self) {
        self.text = self
            .segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() || self.text.trim().is_empty()
    }

    /// Check structural invariants: segments ordered and non-overlapping by
    /// start time, each word's window inside its segment's.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.segments.windows(2) {
            if pair[1].start < pair[0].start {
                return Err(format!(
                    "segments {} and {} out of order",
                    pair[0].id, pair[1].id
                ));
            }
            if pair[1].start < pair[0].end {
                return Err(format!(
                    "segments {} and {} overlap",
                    pair[0].id, pair[1].id
                ));
            }
        }
        for segment in &self.segments {
            if segment.end < segment.start {
                return Err(format!("segment {} has negative span", segment.id));
            }
            for word in &segment.words {
                if word.start < segment.start || word.end > segment.end {
                    return Err(format!(
                        "word {} escapes segment {} window",
                        word.id, segment.id
                    ));
                }
            }
        }
        Ok(())
    }
}

impl WhisperResult {
    /// Build a single-segment result with evenly spaced word timings.
    /// Used by the mock engine and anywhere a plain string needs to enter
    /// the structured pipeline.
    pub fn synthetic(text: &str, language: Option<&str>, duration_secs: f64) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let n = tokens.len().max(1) as f64;
        let span = duration_secs / n;
        let words: Vec<Word> = tokens
            .iter()
            .enumerate()
            .map(|(i, w)| Word {
                id: i as u32,
                segment_id: 0,
                start: i as f64 * span,
                end: (i as f64 + 1.0) * span,
                word: w.to_string(),
                probability: 0.9,
            })
            .collect();
        Self {
            language: language.map(str::to_string),
            text: text.to_string(),
            segments: vec![Segment {
                id: 0,
                start: 0.0,
                end: duration_secs,
                text: text.to_string(),
                avg_logprob: -0.2,
                compression_ratio: 1.0,
                no_speech_prob: 0.01,
                temperature: 0.0,
                // One placeholder token per word so refinement accepts it
                tokens: (0..words.len() as i64).map(|i| 50_000 + i).collect(),
                words,
            }],
        }
    }
}

impl Segment {
    /// Mean probability across this segment's words, used for confidence
    /// colouring. Falls back to exp(avg_logprob) when word timing is absent.
    pub fn mean_word_probability(&self) -> f64 {
        if self.words.is_empty() {
            return self.avg_logprob.exp().clamp(0.0, 1.0);
        }
        self.words.iter().map(|w| w.probability).sum::<f64>() / self.words.len() as f64
    }

    /// Concatenated word fields, for checking agreement with `text`.
    pub fn joined_words(&self) -> String {
        self.words
            .iter()
            .map(|w| w.word.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// STT task selector. Translate is English-only at the model level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Transcribe,
    Translate,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
        }
    }
}

/// Decoding temperature: a single value or a fallback schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Temperature {
    Single(f64),
    Schedule(Vec<f64>),
}

impl Default for Temperature {
    fn default() -> Self {
        Temperature::Schedule(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0])
    }
}

/// Decoder parameters passed through to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeOptions {
    /// None requests language auto-detection.
    pub language: Option<String>,
    pub task: Task,
    pub temperature: Temperature,
    pub initial_prompt: Option<String>,
    pub condition_on_previous_text: bool,
    pub compression_ratio_threshold: f64,
    pub logprob_threshold: f64,
    pub no_speech_threshold: f64,
    pub word_timestamps: bool,
    /// Backend-specific extras, forwarded verbatim.
    #[serde(default)]
    pub extras: std::collections::BTreeMap<String, serde_json::Value>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            task: Task::Transcribe,
            temperature: Temperature::default(),
            initial_prompt: None,
            condition_on_previous_text: true,
            compression_ratio_threshold: 2.4,
            logprob_threshold: -1.0,
            no_speech_threshold: 0.6,
            word_timestamps: true,
            extras: Default::default(),
        }
    }
}
