//! Merging translated segment texts back into a structured result while
//! keeping word timing usable.

use crate::engine::TranslateEngine;
use verba_foundation::error::TranslateError;
use verba_stt::{Segment, WhisperResult};

/// Replace one segment's text with its translation and reconcile the word
/// array:
/// - equal counts overwrite word-for-word;
/// - more translated words than slots merges the excess into the last slot;
/// - fewer truncates the trailing slots and carries the original last
///   word's end time onto the new last word.
pub fn reconcile_segment(segment: &mut Segment, translated: &str) {
    let translated_words: Vec<&str> = translated.split_whitespace().collect();
    segment.text = translated.to_string();

    if segment.words.is_empty() || translated_words.is_empty() {
        segment.words.clear();
        return;
    }

    let original_count = segment.words.len();
    let translated_count = translated_words.len();
    let original_last_end = segment.words[original_count - 1].end;

    if translated_count >= original_count {
        for (slot, word) in segment.words.iter_mut().zip(translated_words.iter()) {
            slot.word = word.to_string();
        }
        if translated_count > original_count {
            // Excess words share the last slot's timing
            let tail = translated_words[original_count..].join(" ");
            let last = &mut segment.words[original_count - 1];
            last.word = format!("{} {}", last.word, tail);
        }
    } else {
        for (slot, word) in segment.words.iter_mut().zip(translated_words.iter()) {
            slot.word = word.to_string();
        }
        segment.words.truncate(translated_count);
        segment.words[translated_count - 1].end = original_last_end;
    }
}

/// Translate every segment of `result` in one batch and mutate it in
/// place. A short response keeps the remaining segments untranslated; any
/// engine failure leaves the whole result as transcribed.
/// Returns the number of segments translated.
pub fn translate_result(
    engine: &dyn TranslateEngine,
    result: &mut WhisperResult,
    source: &str,
    target: &str,
) -> Result<usize, TranslateError> {
    if result.segments.is_empty() {
        return Ok(0);
    }
    let texts: Vec<String> = result.segments.iter().map(|s| s.text.clone()).collect();
    let translated = engine.translate_batch(&texts, source, target)?;

    if translated.len() < texts.len() {
        tracing::warn!(
            "{} returned {} translations for {} segments; keeping the rest as transcribed",
            engine.name(),
            translated.len(),
            texts.len()
        );
    }

    let applied = translated.len().min(result.segments.len());
    for (segment, text) in result.segments.iter_mut().zip(translated.iter()) {
        reconcile_segment(segment, text);
    }
    result.rebuild_text();
    // A partial response leaves untranslated tails, so the result is only
    // in the target language when every segment was rewritten
    if applied == result.segments.len() {
        result.language = Some(target.to_string());
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(Vec<String>);
    impl TranslateEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn translate_batch(
            &self,
            _texts: &[String],
            _source: &str,
            _target: &str,
        ) -> Result<Vec<String>, TranslateError> {
            Ok(self.0.clone())
        }
    }

    fn segment(text: &str) -> Segment {
        WhisperResult::synthetic(text, Some("en"), 3.0)
            .segments
            .remove(0)
    }

    #[test]
    fn equal_count_overwrites_in_order() {
        let mut seg = segment("the cat sits");
        reconcile_segment(&mut seg, "le chat sied");
        assert_eq!(seg.words.len(), 3);
        assert_eq!(seg.joined_words(), "le chat sied");
        assert_eq!(seg.text, "le chat sied");
    }

    #[test]
    fn excess_words_merge_into_last_slot() {
        let mut seg = segment("good morning");
        let ends: Vec<f64> = seg.words.iter().map(|w| w.end).collect();
        reconcile_segment(&mut seg, "bonne journée à tous");
        assert_eq!(seg.words.len(), 2);
        assert_eq!(seg.words[0].word, "bonne");
        assert_eq!(seg.words[1].word, "journée à tous");
        assert_eq!(seg.words[1].end, ends[1]);
    }

    #[test]
    fn fewer_words_truncate_and_carry_end_time() {
        let mut seg = segment("I am very happy today");
        let original_end = seg.words.last().unwrap().end;
        reconcile_segment(&mut seg, "estoy feliz");
        assert_eq!(seg.words.len(), 2);
        assert_eq!(seg.joined_words(), "estoy feliz");
        assert_eq!(seg.words[1].end, original_end);
        // monotone: last word end >= all earlier ends
        for w in &seg.words {
            assert!(w.end <= seg.words.last().unwrap().end);
        }
    }

    #[test]
    fn word_count_invariant_holds() {
        for (original, translated) in [
            ("one two three", "a b c"),
            ("one two", "a b c d"),
            ("one two three four", "a b"),
        ] {
            let mut seg = segment(original);
            let o = seg.words.len();
            let t = translated.split_whitespace().count();
            reconcile_segment(&mut seg, translated);
            assert_eq!(seg.words.len(), o.min(t));
        }
    }

    #[test]
    fn short_batch_keeps_trailing_originals() {
        let mut result = WhisperResult::empty();
        result.segments.push(segment("hello there"));
        result.segments.push(segment("second part"));
        result.language = Some("en".into());
        result.rebuild_text();

        let engine = FixedEngine(vec!["bonjour".into()]);
        let applied = translate_result(&engine, &mut result, "en", "fr").unwrap();
        assert_eq!(applied, 1);
        assert_eq!(result.segments[0].text, "bonjour");
        assert_eq!(result.segments[1].text, "second part");
        // Mixed-language output must not claim the target language
        assert_eq!(result.language.as_deref(), Some("en"));
    }

    #[test]
    fn full_batch_sets_target_language() {
        let mut result = WhisperResult::empty();
        result.segments.push(segment("hello there"));
        result.segments.push(segment("second part"));
        result.language = Some("en".into());
        result.rebuild_text();

        let engine = FixedEngine(vec!["bonjour".into(), "deuxième partie".into()]);
        let applied = translate_result(&engine, &mut result, "en", "fr").unwrap();
        assert_eq!(applied, 2);
        assert_eq!(result.language.as_deref(), Some("fr"));
    }

    #[test]
    fn engine_failure_leaves_result_untouched() {
        struct FailEngine;
        impl TranslateEngine for FailEngine {
            fn name(&self) -> &'static str {
                "fail"
            }
            fn translate_batch(
                &self,
                _: &[String],
                _: &str,
                _: &str,
            ) -> Result<Vec<String>, TranslateError> {
                Err(TranslateError::Network("offline".into()))
            }
        }
        let mut result = WhisperResult::synthetic("hello world", Some("en"), 2.0);
        let before = result.clone();
        assert!(translate_result(&FailEngine, &mut result, "en", "fr").is_err());
        assert_eq!(result, before);
    }
}
