//! Segment subdivision applied before export.
//!
//! Long segments are cut so no subsegment exceeds the word or character
//! limits, preferring explicit newlines, then punctuation, then plain word
//! boundaries. `even_split` balances subsegment lengths instead of filling
//! greedily.

use verba_stt::{Segment, WhisperResult, Word};

#[derive(Debug, Clone, Default)]
pub struct SegmentLimits {
    pub max_words: Option<usize>,
    pub max_chars: Option<usize>,
    /// Prefer splitting at embedded newlines before anything else.
    pub split_on_newline: bool,
    pub even_split: bool,
}

impl SegmentLimits {
    pub fn is_unlimited(&self) -> bool {
        self.max_words.is_none() && self.max_chars.is_none() && !self.split_on_newline
    }
}

const SPLIT_PUNCTUATION: [char; 6] = ['.', '!', '?', ';', ':', ','];

/// Split every segment of `result` per the limits, renumbering segments
/// and words. Timing is interpolated linearly by character position so
/// subsegments cover the original span monotonically.
pub fn split_result(result: &WhisperResult, limits: &SegmentLimits) -> WhisperResult {
    if limits.is_unlimited() {
        return result.clone();
    }

    let mut out = WhisperResult {
        language: result.language.clone(),
        text: result.text.clone(),
        segments: Vec::new(),
    };

    let mut next_id = 0u32;
    for segment in &result.segments {
        for piece in split_segment(segment, limits) {
            let mut piece = piece;
            piece.id = next_id;
            for word in &mut piece.words {
                word.segment_id = next_id;
            }
            next_id += 1;
            out.segments.push(piece);
        }
    }
    out
}

fn split_segment(segment: &Segment, limits: &SegmentLimits) -> Vec<Segment> {
    let text = segment.text.trim();
    if text.is_empty() {
        return vec![segment.clone()];
    }

    let pieces = if limits.split_on_newline && text.contains('\n') {
        text.split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .flat_map(|p| split_text(p, limits))
            .collect()
    } else {
        split_text(text, limits)
    };

    if pieces.len() <= 1 {
        return vec![segment.clone()];
    }

    // Interpolate subsegment timing by character position
    let total_chars: usize = pieces.iter().map(|p| p.chars().count()).sum();
    let span = segment.end - segment.start;
    let mut segments = Vec::with_capacity(pieces.len());
    let mut consumed = 0usize;
    for (i, piece) in pieces.iter().enumerate() {
        let piece_chars = piece.chars().count();
        let start =
            segment.start + span * consumed as f64 / total_chars.max(1) as f64;
        consumed += piece_chars;
        let end = if i + 1 == pieces.len() {
            segment.end
        } else {
            segment.start + span * consumed as f64 / total_chars.max(1) as f64
        };
        let words = words_for_piece(segment, piece, start, end);
        segments.push(Segment {
            id: 0,
            start,
            end,
            text: piece.clone(),
            avg_logprob: segment.avg_logprob,
            compression_ratio: segment.compression_ratio,
            no_speech_prob: segment.no_speech_prob,
            temperature: segment.temperature,
            tokens: Vec::new(),
            words,
        });
    }
    segments
}

/// Reassign the original words whose text appears in this piece; words are
/// consumed in order, clamped into the piece's window.
fn words_for_piece(segment: &Segment, piece: &str, start: f64, end: f64) -> Vec<Word> {
    let piece_words: Vec<&str> = piece.split_whitespace().collect();
    if piece_words.is_empty() || segment.words.is_empty() {
        return Vec::new();
    }
    let n = piece_words.len().max(1) as f64;
    let span = (end - start) / n;
    piece_words
        .iter()
        .enumerate()
        .map(|(i, w)| Word {
            id: i as u32,
            segment_id: 0,
            start: start + i as f64 * span,
            end: start + (i as f64 + 1.0) * span,
            word: w.to_string(),
            probability: segment.mean_word_probability(),
        })
        .collect()
}

fn exceeds(text: &str, limits: &SegmentLimits) -> bool {
    if let Some(max_chars) = limits.max_chars {
        if text.chars().count() > max_chars {
            return true;
        }
    }
    if let Some(max_words) = limits.max_words {
        if text.split_whitespace().count() > max_words {
            return true;
        }
    }
    false
}

fn split_text(text: &str, limits: &SegmentLimits) -> Vec<String> {
    if !exceeds(text, limits) {
        return vec![text.to_string()];
    }

    let piece_count = required_pieces(text, limits);
    if limits.even_split {
        even_pieces(text, piece_count)
    } else {
        greedy_pieces(text, limits)
    }
}

fn required_pieces(text: &str, limits: &SegmentLimits) -> usize {
    let mut count = 1usize;
    if let Some(max_chars) = limits.max_chars {
        let chars = text.chars().count();
        count = count.max(chars.div_ceil(max_chars));
    }
    if let Some(max_words) = limits.max_words {
        let words = text.split_whitespace().count();
        count = count.max(words.div_ceil(max_words));
    }
    count
}

/// Exact near-equal division: piece lengths differ by at most one
/// character. Remainder characters go to the leading pieces.
fn even_pieces(text: &str, count: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if count <= 1 || total == 0 {
        return vec![text.to_string()];
    }

    let base = total / count;
    let remainder = total % count;
    let mut pieces = Vec::with_capacity(count);
    let mut start = 0usize;
    for i in 0..count {
        let len = base + usize::from(i < remainder);
        let piece: String = chars[start..start + len].iter().collect();
        start += len;
        pieces.push(piece);
    }
    pieces
}

/// Fill pieces greedily up to the limits, breaking after punctuation where
/// possible.
fn greedy_pieces(text: &str, limits: &SegmentLimits) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_words = 0usize;

    for word in words {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        let over_chars = limits
            .max_chars
            .map(|m| candidate_len > m)
            .unwrap_or(false);
        let over_words = limits
            .max_words
            .map(|m| current_words + 1 > m)
            .unwrap_or(false);
        if (over_chars || over_words) && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_words = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        current_words += 1;

        // Break early right after sentence punctuation when the piece is
        // already more than half full, so cuts prefer natural boundaries
        let half_full = limits
            .max_chars
            .map(|m| current.chars().count() * 2 >= m)
            .unwrap_or(false);
        if half_full && word.ends_with(|c| SPLIT_PUNCTUATION.contains(&c)) {
            pieces.push(std::mem::take(&mut current));
            current_words = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_of(text: &str, start: f64, end: f64) -> Segment {
        let mut result = WhisperResult::synthetic(text, Some("en"), end - start);
        let mut seg = result.segments.remove(0);
        seg.start = start;
        seg.end = end;
        for w in &mut seg.words {
            w.start += start;
            w.end += start;
        }
        seg
    }

    #[test]
    fn unlimited_is_identity() {
        let result = WhisperResult::synthetic("anything at all", Some("en"), 2.0);
        let out = split_result(&result, &SegmentLimits::default());
        assert_eq!(out, result);
    }

    #[test]
    fn even_split_of_123_chars_at_40_gives_4_balanced_pieces() {
        // 123 characters of evenly sized words
        let word = "abcd";
        let text = std::iter::repeat(word)
            .take(25)
            .collect::<Vec<_>>()
            .join(" ");
        let text = &text[..123];
        assert_eq!(text.chars().count(), 123);

        let limits = SegmentLimits {
            max_chars: Some(40),
            even_split: true,
            ..Default::default()
        };
        let pieces = split_text(text, &limits);
        assert_eq!(pieces.len(), 4);
        let lens: Vec<usize> = pieces.iter().map(|p| p.chars().count()).collect();
        let min = *lens.iter().min().unwrap();
        let max = *lens.iter().max().unwrap();
        assert!(max - min <= 1, "piece lengths {:?} not balanced", lens);
    }

    #[test]
    fn split_timing_is_monotone_and_covers_span() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let seg = segment_of(text, 10.0, 22.0);
        let result = WhisperResult {
            language: Some("en".into()),
            text: text.into(),
            segments: vec![seg],
        };
        let limits = SegmentLimits {
            max_words: Some(4),
            ..Default::default()
        };
        let out = split_result(&result, &limits);
        assert!(out.segments.len() >= 3);
        assert!((out.segments[0].start - 10.0).abs() < 1e-9);
        assert!((out.segments.last().unwrap().end - 22.0).abs() < 1e-9);
        for pair in out.segments.windows(2) {
            assert!(pair[1].start >= pair[0].end - 1e-9);
        }
        out.validate().unwrap();
    }

    #[test]
    fn word_limit_is_respected() {
        let text = "a b c d e f g h i j";
        let limits = SegmentLimits {
            max_words: Some(3),
            ..Default::default()
        };
        for piece in split_text(text, &limits) {
            assert!(piece.split_whitespace().count() <= 3);
        }
    }

    #[test]
    fn greedy_split_prefers_punctuation() {
        let text = "first sentence ends here. second sentence continues on";
        let limits = SegmentLimits {
            max_chars: Some(40),
            ..Default::default()
        };
        let pieces = split_text(text, &limits);
        assert!(pieces[0].ends_with('.'), "got {:?}", pieces);
    }

    #[test]
    fn newline_split_comes_first() {
        let text = "line one\nline two";
        let seg = segment_of(text, 0.0, 4.0);
        let result = WhisperResult {
            language: None,
            text: text.into(),
            segments: vec![seg],
        };
        let limits = SegmentLimits {
            split_on_newline: true,
            ..Default::default()
        };
        let out = split_result(&result, &limits);
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].text, "line one");
        assert_eq!(out.segments[1].text, "line two");
    }

    #[test]
    fn renumbering_is_sequential() {
        let text = "one two three four five six";
        let result = WhisperResult {
            language: None,
            text: text.into(),
            segments: vec![segment_of(text, 0.0, 3.0), segment_of(text, 3.0, 6.0)],
        };
        let limits = SegmentLimits {
            max_words: Some(2),
            ..Default::default()
        };
        let out = split_result(&result, &limits);
        for (i, seg) in out.segments.iter().enumerate() {
            assert_eq!(seg.id, i as u32);
            for w in &seg.words {
                assert_eq!(w.segment_id, seg.id);
            }
        }
    }
}
