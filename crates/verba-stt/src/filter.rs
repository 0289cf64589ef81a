//! Hallucination filtering and repetition removal for raw model output.

use std::collections::BTreeMap;
use std::path::Path;

use crate::types::WhisperResult;
use verba_foundation::resolve::jaro_winkler;

/// Bundled base filter list, used when no user file is configured or the
/// configured file cannot be read.
const BUNDLED_FILTERS: &str = include_str!("../data/filters.json");

/// Near-duplicate similarity floor for repetition removal.
const REPETITION_SIMILARITY: f64 = 0.9;

/// Per-language list of known spurious model outputs.
#[derive(Debug, Clone)]
pub struct HallucinationFilter {
    by_language: BTreeMap<String, Vec<String>>,
    pub case_insensitive: bool,
}

impl HallucinationFilter {
    pub fn bundled() -> Self {
        // The bundled file is compiled in and validated by test, so a parse
        // failure here cannot happen at runtime.
        let by_language = serde_json::from_str(BUNDLED_FILTERS).unwrap_or_default();
        Self {
            by_language,
            case_insensitive: true,
        }
    }

    /// Load a user filter file, falling back to the bundled list on any
    /// read or parse failure.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, Vec<String>>>(&raw) {
                Ok(by_language) => Self {
                    by_language,
                    case_insensitive: true,
                },
                Err(e) => {
                    tracing::warn!("Filter file {} is invalid ({}); using bundled list", path.display(), e);
                    Self::bundled()
                }
            },
            Err(e) => {
                tracing::warn!("Cannot read filter file {} ({}); using bundled list", path.display(), e);
                Self::bundled()
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            by_language: BTreeMap::new(),
            case_insensitive: true,
        }
    }

    fn normalize(&self, text: &str) -> String {
        let trimmed: String = text
            .trim()
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();
        if self.case_insensitive {
            trimmed.to_lowercase()
        } else {
            trimmed
        }
    }

    /// Remove segments whose normalized text matches a filter entry for the
    /// given language. With no entries for the language this is the
    /// identity transform. Returns the number of segments removed.
    pub fn apply(&self, result: &mut WhisperResult, language: &str) -> usize {
        let Some(entries) = self.by_language.get(&language.to_lowercase()) else {
            return 0;
        };
        let normalized: Vec<String> = entries.iter().map(|e| self.normalize(e)).collect();

        let before = result.segments.len();
        result.segments.retain(|segment| {
            let text = self.normalize(&segment.text);
            !normalized.iter().any(|entry| *entry == text)
        });
        let removed = before - result.segments.len();
        if removed > 0 {
            result.rebuild_text();
            tracing::debug!("Hallucination filter removed {} segment(s)", removed);
        }
        removed
    }

    pub fn languages(&self) -> impl Iterator<Item = &String> {
        self.by_language.keys()
    }
}

/// Drop segments that near-duplicate an immediately preceding segment,
/// keeping at most `allowed` consecutive occurrences of the same text.
pub fn remove_repetitions(result: &mut WhisperResult, allowed: usize) -> usize {
    if allowed == 0 || result.segments.len() < 2 {
        return 0;
    }
    let mut kept = Vec::with_capacity(result.segments.len());
    let mut run_text: Option<String> = None;
    let mut run_len = 0usize;
    let before = result.segments.len();

    for segment in result.segments.drain(..) {
        let text = segment.text.trim().to_lowercase();
        let is_repeat = run_text
            .as_deref()
            .map(|prev| jaro_winkler(prev, &text) >= REPETITION_SIMILARITY)
            .unwrap_or(false);
        if is_repeat {
            run_len += 1;
        } else {
            run_text = Some(text);
            run_len = 1;
        }
        if run_len <= allowed {
            kept.push(segment);
        }
    }

    result.segments = kept;
    let removed = before - result.segments.len();
    if removed > 0 {
        result.rebuild_text();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WhisperResult;

    fn result_with(texts: &[&str]) -> WhisperResult {
        let mut result = WhisperResult::empty();
        for (i, t) in texts.iter().enumerate() {
            let mut one = WhisperResult::synthetic(t, Some("en"), 1.0);
            let mut seg = one.segments.remove(0);
            seg.id = i as u32;
            seg.start = i as f64;
            seg.end = i as f64 + 1.0;
            result.segments.push(seg);
        }
        result.rebuild_text();
        result
    }

    #[test]
    fn bundled_filters_parse() {
        let filter = HallucinationFilter::bundled();
        assert!(filter.languages().count() > 5);
    }

    #[test]
    fn matching_segment_is_removed() {
        let filter = HallucinationFilter::bundled();
        let mut result = result_with(&["real speech here", "Thanks for watching!"]);
        let removed = filter.apply(&mut result, "English");
        assert_eq!(removed, 1);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.text, "real speech here");
    }

    #[test]
    fn match_ignores_case_and_punctuation() {
        let filter = HallucinationFilter::bundled();
        let mut result = result_with(&["thanks for watching"]);
        assert_eq!(filter.apply(&mut result, "english"), 1);
    }

    #[test]
    fn empty_filter_is_identity() {
        let filter = HallucinationFilter::empty();
        let mut result = result_with(&["Thanks for watching!", "more"]);
        let before = result.clone();
        assert_eq!(filter.apply(&mut result, "english"), 0);
        assert_eq!(result, before);
    }

    #[test]
    fn unknown_language_is_identity() {
        let filter = HallucinationFilter::bundled();
        let mut result = result_with(&["Thanks for watching!"]);
        assert_eq!(filter.apply(&mut result, "klingon"), 0);
    }

    #[test]
    fn repetition_run_is_capped() {
        let mut result = result_with(&["hello there", "hello there", "hello there", "goodbye"]);
        let removed = remove_repetitions(&mut result, 1);
        assert_eq!(removed, 2);
        let texts: Vec<&str> = result.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["hello there", "goodbye"]);
    }

    #[test]
    fn near_duplicates_count_as_repeats() {
        let mut result = result_with(&["the cat sits", "the cat sits.", "next sentence"]);
        let removed = remove_repetitions(&mut result, 1);
        assert_eq!(removed, 1);
        assert_eq!(result.segments.len(), 2);
    }

    #[test]
    fn allowed_zero_disables_removal() {
        let mut result = result_with(&["same", "same"]);
        assert_eq!(remove_repetitions(&mut result, 0), 0);
        assert_eq!(result.segments.len(), 2);
    }
}
