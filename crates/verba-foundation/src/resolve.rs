//! Name resolution shared by device and translator-language lookups.
//!
//! Scoring is deterministic: an exact match wins outright, then a
//! case-insensitive substring match, then Jaro-Winkler similarity with a
//! 0.6 acceptance floor.

/// Minimum Jaro-Winkler similarity for a fuzzy match to be accepted.
pub const MIN_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub index: usize,
    pub score: f64,
}

/// Resolve `query` against `candidates`. Returns the best candidate index
/// or None when nothing clears the similarity floor.
pub fn resolve_name(query: &str, candidates: &[&str]) -> Option<Resolution> {
    let query_lower = query.to_lowercase();

    // Exact match first
    if let Some(index) = candidates.iter().position(|c| *c == query) {
        return Some(Resolution { index, score: 1.0 });
    }

    // Case-insensitive substring beats similarity scoring
    if let Some(index) = candidates
        .iter()
        .position(|c| c.to_lowercase().contains(&query_lower))
    {
        return Some(Resolution { index, score: 0.99 });
    }

    let mut best: Option<Resolution> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = jaro_winkler(&query_lower, &candidate.to_lowercase());
        if score >= MIN_SIMILARITY && best.as_ref().map(|b| score > b.score).unwrap_or(true) {
            best = Some(Resolution { index, score });
        }
    }
    best
}

/// Jaro similarity of two strings.
fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let match_window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];

    let mut matches = 0usize;
    for (i, ca) in a.iter().enumerate() {
        let lo = i.saturating_sub(match_window);
        let hi = (i + match_window + 1).min(b.len());
        for j in lo..hi {
            if !b_matched[j] && *ca == b[j] {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    // Count transpositions among matched characters
    let mut transpositions = 0usize;
    let mut j = 0usize;
    for (i, matched) in a_matched.iter().enumerate() {
        if !matched {
            continue;
        }
        while !b_matched[j] {
            j += 1;
        }
        if a[i] != b[j] {
            transpositions += 1;
        }
        j += 1;
    }

    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64 / 2.0) / m) / 3.0
}

/// Jaro-Winkler: Jaro with a prefix bonus of up to 4 characters.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro_score = jaro(a, b);

    let prefix_len = a
        .chars()
        .zip(b.chars())
        .take(4)
        .take_while(|(ca, cb)| ca == cb)
        .count();

    jaro_score + prefix_len as f64 * 0.1 * (1.0 - jaro_score)
}
