//! Sentence list to fragment list composition: colouring, separators,
//! front truncation, and line wrapping.

use crate::color::{confidence_color, Color};
use crate::fragment::{total_len, ToInsert};
use crate::store::Sentence;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Appended to each sentence's final fragment; HTML entities are
    /// decoded before insertion.
    pub separator: String,
    /// Total display length cap; 0 disables truncation.
    pub max_chars: usize,
    /// Per-line length cap; 0 disables wrapping.
    pub max_per_line: usize,
    pub colorize_per_segment: bool,
    pub colorize_per_word: bool,
    pub low_conf_color: Color,
    pub high_conf_color: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            separator: "&#10;".into(),
            max_chars: 0,
            max_per_line: 0,
            colorize_per_segment: false,
            colorize_per_word: false,
            low_conf_color: Color::rgb(0xff, 0x60, 0x60),
            high_conf_color: Color::rgb(0x60, 0xff, 0x60),
        }
    }
}

/// Decode the HTML entities users put in separator settings into literal
/// characters. Unknown entities pass through unchanged.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded: Option<char> = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => {
                if let Some(num) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(num, 16).ok().and_then(char::from_u32)
                } else if let Some(num) = entity.strip_prefix('#') {
                    num.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Step 1: map a sentence list to coloured fragments, appending the
/// decoded separator to each sentence's final fragment.
pub fn map_sentences(sentences: &[&Sentence], config: &RenderConfig) -> Vec<ToInsert> {
    let separator = decode_entities(&config.separator);
    let mut fragments = Vec::new();

    for sentence in sentences {
        let start = fragments.len();
        match sentence {
            Sentence::Plain(text) => fragments.push(ToInsert::plain(text.clone())),
            Sentence::Structured(result) => {
                if config.colorize_per_word {
                    for segment in &result.segments {
                        let word_count = segment.words.len();
                        for (i, word) in segment.words.iter().enumerate() {
                            let color = confidence_color(
                                config.low_conf_color,
                                config.high_conf_color,
                                word.probability,
                            );
                            let mut text = word.word.trim().to_string();
                            if i + 1 < word_count {
                                text.push(' ');
                            }
                            fragments.push(ToInsert::colored(text, color));
                        }
                    }
                } else if config.colorize_per_segment {
                    for segment in &result.segments {
                        let color = confidence_color(
                            config.low_conf_color,
                            config.high_conf_color,
                            segment.mean_word_probability(),
                        );
                        fragments.push(ToInsert::colored(segment.text.trim().to_string(), color));
                    }
                } else {
                    fragments.push(ToInsert::plain(result.text.clone()));
                }
            }
        }
        if fragments.len() == start {
            continue;
        }
        for frag in &mut fragments[start..] {
            frag.is_last = false;
        }
        let last = fragments.len() - 1;
        fragments[last].text.push_str(&separator);
        fragments[last].is_last = true;
    }

    fragments
}

/// Step 2: delete leading characters until the total fits `max_chars`.
pub fn truncate_front(fragments: &mut Vec<ToInsert>, max_chars: usize) {
    if max_chars == 0 {
        return;
    }
    let mut excess = total_len(fragments).saturating_sub(max_chars);
    while excess > 0 {
        let Some(first) = fragments.first_mut() else {
            return;
        };
        let len = first.text.chars().count();
        if len <= excess {
            fragments.remove(0);
            excess -= len;
        } else {
            first.text = first.text.chars().skip(excess).collect();
            excess = 0;
        }
    }
}

/// Step 3: re-segment fragments so no display line exceeds `limit`
/// characters. Splits happen at word boundaries (long words are
/// hard-split as a last resort) and keep each piece's colour; only the
/// final piece of a fragment keeps its `is_last` flag.
pub fn wrap(fragments: Vec<ToInsert>, limit: usize) -> Vec<ToInsert> {
    if limit == 0 {
        return fragments;
    }

    let mut out = Vec::with_capacity(fragments.len());
    let mut line_len = 0usize;

    for frag in fragments {
        let mut pieces: Vec<String> = Vec::new();
        let mut cur = String::new();
        let mut chars = frag.text.chars().peekable();

        let break_line = |cur: &mut String, pieces: &mut Vec<String>| {
            cur.push('\n');
            pieces.push(std::mem::take(cur));
        };

        while let Some(&c) = chars.peek() {
            if c == '\n' {
                chars.next();
                break_line(&mut cur, &mut pieces);
                line_len = 0;
            } else if c.is_whitespace() {
                chars.next();
                if line_len + 1 > limit {
                    break_line(&mut cur, &mut pieces);
                    line_len = 0;
                } else {
                    cur.push(c);
                    line_len += 1;
                }
            } else {
                let mut word = String::new();
                while let Some(&w) = chars.peek() {
                    if w == '\n' || w.is_whitespace() {
                        break;
                    }
                    word.push(w);
                    chars.next();
                }
                let mut wlen = word.chars().count();
                if line_len > 0 && line_len + wlen > limit {
                    // Break before the word; a trailing space stays on the
                    // previous line
                    break_line(&mut cur, &mut pieces);
                    line_len = 0;
                }
                while wlen > limit {
                    // A single word longer than the line cannot keep the
                    // boundary rule; hard-split it
                    let head: String = word.chars().take(limit).collect();
                    word = word.chars().skip(limit).collect();
                    wlen -= limit;
                    cur.push_str(&head);
                    break_line(&mut cur, &mut pieces);
                    line_len = 0;
                }
                cur.push_str(&word);
                line_len += wlen;
            }
        }
        if !cur.is_empty() {
            pieces.push(cur);
        }

        pieces.retain(|p| !p.is_empty());
        let count = pieces.len();
        for (i, piece) in pieces.into_iter().enumerate() {
            out.push(ToInsert {
                text: piece,
                color: frag.color,
                is_last: if i + 1 == count { frag.is_last } else { false },
            });
        }
    }

    out
}

/// Full composition pipeline for one display area.
pub fn compose(sentences: &[&Sentence], config: &RenderConfig) -> Vec<ToInsert> {
    let mut fragments = map_sentences(sentences, config);
    truncate_front(&mut fragments, config.max_chars);
    wrap(fragments, config.max_per_line)
}
