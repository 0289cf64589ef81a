use crate::color::Color;

/// One coloured run of text bound for a display sink. A sentence renders
/// as a sequence of fragments whose concatenated text is exactly what the
/// sink shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ToInsert {
    pub text: String,
    pub color: Option<Color>,
    /// False for fragments that continue on the same line after a wrap
    /// split; true for a sentence's final fragment.
    pub is_last: bool,
}

impl ToInsert {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            is_last: true,
        }
    }

    pub fn colored(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
            is_last: true,
        }
    }
}

/// Total displayed character count of a fragment list.
pub fn total_len(fragments: &[ToInsert]) -> usize {
    fragments.iter().map(|f| f.text.chars().count()).sum()
}

/// Concatenated display text.
pub fn joined_text(fragments: &[ToInsert]) -> String {
    fragments.iter().map(|f| f.text.as_str()).collect()
}
