//! Result store and display composition.
//!
//! The store keeps transcription and translation history with identity-based
//! translation attachment; composition turns sentence lists into coloured
//! fragments ready for any sink.

pub mod color;
pub mod compose;
pub mod fragment;
pub mod store;

pub use color::{confidence_color, Color};
pub use compose::{compose, decode_entities, map_sentences, truncate_front, wrap, RenderConfig};
pub use fragment::{joined_text, total_len, ToInsert};
pub use store::{ResultStore, Sentence, StoreEntry};

/// Scripts rendered right-to-left; sinks apply BiDi display order when the
/// detected language is one of these.
pub fn is_rtl_language(language: &str) -> bool {
    matches!(
        language.to_lowercase().as_str(),
        "ar" | "arabic" | "he" | "iw" | "hebrew" | "fa" | "persian" | "ur" | "urdu"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtl_detection() {
        assert!(is_rtl_language("Arabic"));
        assert!(is_rtl_language("fa"));
        assert!(!is_rtl_language("english"));
    }
}
