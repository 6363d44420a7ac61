use crate::DocId;
use std::collections::{BTreeSet, HashMap};

/// Raw occurrence counts of one document's terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermCounts {
    pub counts: HashMap<String, u32>,
    /// Sum of all counts; the normalization denominator for scoring.
    pub total: u32,
}

/// Inverted index (`term -> doc ids`) paired with the per-document term-frequency
/// table. Both halves are only mutated together through `merge` and `remove`.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<DocId>>,
    freqs: HashMap<DocId, TermCounts>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Index a document's token stream. `terms` must be the deduplicated `tokens`.
    /// Re-merging an id replaces its previous entry.
    pub fn merge(&mut self, doc_id: DocId, tokens: &[String], terms: &BTreeSet<String>) {
        if self.freqs.contains_key(&doc_id) {
            self.remove(doc_id);
        }
        for term in terms {
            self.postings.entry(term.clone()).or_default().insert(doc_id);
        }
        let mut tc = TermCounts::default();
        for token in tokens {
            *tc.counts.entry(token.clone()).or_insert(0) += 1;
            tc.total += 1;
        }
        self.freqs.insert(doc_id, tc);
    }

    /// Drop a document from both structures. Terms left without postings disappear.
    pub fn remove(&mut self, doc_id: DocId) -> bool {
        let Some(tc) = self.freqs.remove(&doc_id) else { return false };
        for term in tc.counts.keys() {
            if let Some(set) = self.postings.get_mut(term) {
                set.remove(&doc_id);
                if set.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }

    pub fn postings(&self, term: &str) -> Option<&BTreeSet<DocId>> { self.postings.get(term) }

    pub fn term_counts(&self, doc_id: DocId) -> Option<&TermCounts> { self.freqs.get(&doc_id) }

    pub fn term_frequency(&self, doc_id: DocId, term: &str) -> u32 {
        self.freqs.get(&doc_id).and_then(|tc| tc.counts.get(term)).copied().unwrap_or(0)
    }

    pub fn total_terms(&self, doc_id: DocId) -> u32 {
        self.freqs.get(&doc_id).map(|tc| tc.total).unwrap_or(0)
    }

    pub fn unique_terms(&self) -> usize { self.postings.len() }

    pub fn num_docs(&self) -> usize { self.freqs.len() }

    pub fn clear(&mut self) {
        self.postings.clear();
        self.freqs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::analyze;

    fn merge_text(idx: &mut InvertedIndex, id: DocId, text: &str) {
        let a = analyze(text);
        idx.merge(id, &a.tokens, &a.terms);
    }

    #[test]
    fn counts_raw_occurrences() {
        let mut idx = InvertedIndex::new();
        merge_text(&mut idx, 1, "rust rust tokio");
        assert_eq!(idx.term_frequency(1, "rust"), 2);
        assert_eq!(idx.total_terms(1), 3);
        assert_eq!(idx.postings("rust").unwrap().len(), 1);
        assert_eq!(idx.unique_terms(), 2);
    }

    #[test]
    fn remove_drops_orphaned_terms() {
        let mut idx = InvertedIndex::new();
        merge_text(&mut idx, 1, "shared alpha");
        merge_text(&mut idx, 2, "shared bravo");
        assert!(idx.remove(1));
        assert!(idx.postings("alpha").is_none());
        assert_eq!(idx.postings("shared").unwrap().iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(!idx.remove(1));
    }

    #[test]
    fn remerge_replaces_previous_terms() {
        let mut idx = InvertedIndex::new();
        merge_text(&mut idx, 7, "legacy cobol");
        merge_text(&mut idx, 7, "modern rust");
        assert!(idx.postings("cobol").is_none());
        assert_eq!(idx.total_terms(7), 2);
        assert_eq!(idx.num_docs(), 1);
    }
}
