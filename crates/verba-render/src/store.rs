use std::collections::VecDeque;

use verba_stt::WhisperResult;

/// A committed display sentence: either raw text or a full structured
/// result. The renderer branches on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Plain(String),
    Structured(WhisperResult),
}

impl Sentence {
    pub fn text(&self) -> &str {
        match self {
            Sentence::Plain(text) => text,
            Sentence::Structured(result) => &result.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub utterance_id: u64,
    pub sentence: Sentence,
}

/// Transcription and translation history plus the in-progress slot.
///
/// Single-writer: the scheduler and translator mutate it through one serial
/// actor; readers take snapshots. Utterance ids increase monotonically and
/// translations attach by id, so a late translation can never land on a
/// newer utterance.
#[derive(Debug, Clone)]
pub struct ResultStore {
    max_sentences: usize,
    next_utterance_id: u64,
    tc_sentences: VecDeque<StoreEntry>,
    tl_sentences: VecDeque<StoreEntry>,
    pending_tc: Option<Sentence>,
    pending_tl: Option<Sentence>,
}

impl ResultStore {
    /// `max_sentences` is clamped to the 1..=100 range.
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.clamp(1, 100),
            next_utterance_id: 0,
            tc_sentences: VecDeque::new(),
            tl_sentences: VecDeque::new(),
            pending_tc: None,
            pending_tl: None,
        }
    }

    /// Replace the in-progress transcription shown below the history.
    pub fn set_pending(&mut self, tc: Option<Sentence>, tl: Option<Sentence>) {
        self.pending_tc = tc;
        self.pending_tl = tl;
    }

    /// Commit the current utterance's transcription, clearing the pending
    /// slot. Returns the utterance id the translator should attach to.
    pub fn commit(&mut self, sentence: Sentence) -> u64 {
        let utterance_id = self.next_utterance_id;
        self.next_utterance_id += 1;
        self.tc_sentences.push_back(StoreEntry {
            utterance_id,
            sentence,
        });
        while self.tc_sentences.len() > self.max_sentences {
            self.tc_sentences.pop_front();
        }
        self.pending_tc = None;
        self.pending_tl = None;
        utterance_id
    }

    /// Attach a translation to its utterance. Dropped silently when the
    /// utterance has already been evicted.
    pub fn attach_translation(&mut self, utterance_id: u64, sentence: Sentence) {
        if !self
            .tc_sentences
            .iter()
            .any(|e| e.utterance_id == utterance_id)
        {
            tracing::debug!(
                "Translation for evicted utterance {} discarded",
                utterance_id
            );
            return;
        }
        if let Some(existing) = self
            .tl_sentences
            .iter_mut()
            .find(|e| e.utterance_id == utterance_id)
        {
            existing.sentence = sentence;
            return;
        }
        self.tl_sentences.push_back(StoreEntry {
            utterance_id,
            sentence,
        });
        self.tl_sentences
            .make_contiguous()
            .sort_by_key(|e| e.utterance_id);
        while self.tl_sentences.len() > self.max_sentences {
            self.tl_sentences.pop_front();
        }
    }

    pub fn tc_sentences(&self) -> impl Iterator<Item = &StoreEntry> {
        self.tc_sentences.iter()
    }

    pub fn tl_sentences(&self) -> impl Iterator<Item = &StoreEntry> {
        self.tl_sentences.iter()
    }

    pub fn pending_tc(&self) -> Option<&Sentence> {
        self.pending_tc.as_ref()
    }

    pub fn pending_tl(&self) -> Option<&Sentence> {
        self.pending_tl.as_ref()
    }

    pub fn clear(&mut self) {
        self.tc_sentences.clear();
        self.tl_sentences.clear();
        self.pending_tc = None;
        self.pending_tl = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> Sentence {
        Sentence::Plain(text.to_string())
    }

    #[test]
    fn commit_assigns_monotone_ids() {
        let mut store = ResultStore::new(10);
        let a = store.commit(plain("one"));
        let b = store.commit(plain("two"));
        assert!(b > a);
    }

    #[test]
    fn cap_evicts_oldest() {
        let mut store = ResultStore::new(2);
        store.commit(plain("one"));
        store.commit(plain("two"));
        store.commit(plain("three"));
        let texts: Vec<&str> = store.tc_sentences().map(|e| e.sentence.text()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn max_sentences_one_keeps_only_latest() {
        let mut store = ResultStore::new(1);
        store.commit(plain("old"));
        store.commit(plain("new"));
        let texts: Vec<&str> = store.tc_sentences().map(|e| e.sentence.text()).collect();
        assert_eq!(texts, vec!["new"]);
    }

    #[test]
    fn translation_attaches_by_identity() {
        let mut store = ResultStore::new(10);
        let first = store.commit(plain("hola"));
        let second = store.commit(plain("mundo"));

        // Late translation for the first utterance must not follow the
        // second one
        store.attach_translation(second, plain("world"));
        store.attach_translation(first, plain("hello"));

        let pairs: Vec<(u64, &str)> = store
            .tl_sentences()
            .map(|e| (e.utterance_id, e.sentence.text()))
            .collect();
        assert_eq!(pairs, vec![(first, "hello"), (second, "world")]);
    }

    #[test]
    fn translation_for_evicted_utterance_is_dropped() {
        let mut store = ResultStore::new(1);
        let old = store.commit(plain("old"));
        store.commit(plain("new"));
        store.attach_translation(old, plain("late"));
        assert_eq!(store.tl_sentences().count(), 0);
    }

    #[test]
    fn commit_clears_pending() {
        let mut store = ResultStore::new(10);
        store.set_pending(Some(plain("partial")), None);
        assert!(store.pending_tc().is_some());
        store.commit(plain("full"));
        assert!(store.pending_tc().is_none());
    }

    #[test]
    fn cap_is_clamped() {
        let store = ResultStore::new(0);
        assert_eq!(store.max_sentences, 1);
        let store = ResultStore::new(5000);
        assert_eq!(store.max_sentences, 100);
    }
}
