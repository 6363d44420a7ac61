use crate::document::{DocId, DocType, Document};
use crate::excerpt::{excerpt, DEFAULT_EXCERPT_LENGTH};
use crate::index::InvertedIndex;
use crate::store::DocumentStore;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// A candidate produced by a ranking strategy, before filtering and excerpting.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
    pub matched_terms: Vec<String>,
}

/// Turns a query term set into candidates sorted by descending score.
pub trait RankingStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn rank(&self, terms: &BTreeSet<String>, index: &InvertedIndex) -> Vec<ScoredDoc>;
}

/// Length-normalized term frequency: sum of query-term counts in a document
/// divided by that document's total indexed token count.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermFrequencyRanker;

impl RankingStrategy for TermFrequencyRanker {
    fn name(&self) -> &'static str { "term_frequency" }

    fn rank(&self, terms: &BTreeSet<String>, index: &InvertedIndex) -> Vec<ScoredDoc> {
        let mut raw: HashMap<DocId, (u32, Vec<String>)> = HashMap::new();
        for term in terms {
            let Some(doc_ids) = index.postings(term) else { continue };
            for &doc_id in doc_ids {
                let entry = raw.entry(doc_id).or_default();
                entry.0 += index.term_frequency(doc_id, term);
                entry.1.push(term.clone());
            }
        }

        let mut scored: Vec<ScoredDoc> = raw
            .into_iter()
            .filter_map(|(doc_id, (hits, matched_terms))| {
                let total = index.total_terms(doc_id);
                (total > 0).then(|| ScoredDoc { doc_id, score: hits as f64 / total as f64, matched_terms })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.doc_id.cmp(&b.doc_id)));
        scored
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Only return documents of this type. Applied after ranking, before truncation.
    pub doc_type: Option<DocType>,
    pub top_k: usize,
    pub excerpt_length: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { doc_type: None, top_k: 10, excerpt_length: DEFAULT_EXCERPT_LENGTH }
    }
}

impl SearchOptions {
    pub fn with_type(mut self, doc_type: impl Into<DocType>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: Document,
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub excerpt: String,
}

/// Flat view of a result for API and CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub title: String,
    pub doc_type: DocType,
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub excerpt: String,
}

impl From<SearchResult> for SearchHit {
    fn from(r: SearchResult) -> Self {
        SearchHit {
            doc_id: r.document.id,
            title: r.document.title,
            doc_type: r.document.doc_type,
            score: r.score,
            matched_terms: r.matched_terms,
            excerpt: r.excerpt,
        }
    }
}

/// Rank, filter by type, drop `exclude`, truncate, then excerpt the survivors.
pub(crate) fn execute(
    ranker: &dyn RankingStrategy,
    store: &DocumentStore,
    index: &InvertedIndex,
    terms: &BTreeSet<String>,
    opts: &SearchOptions,
    exclude: Option<DocId>,
) -> Vec<SearchResult> {
    if terms.is_empty() {
        return Vec::new();
    }
    ranker
        .rank(terms, index)
        .into_iter()
        .filter(|s| Some(s.doc_id) != exclude)
        .filter_map(|s| store.get(s.doc_id).map(|doc| (s, doc)))
        .filter(|(_, doc)| opts.doc_type.as_ref().map_or(true, |t| &doc.doc_type == t))
        .take(opts.top_k)
        .map(|(s, doc)| SearchResult {
            excerpt: excerpt(&doc.content, &s.matched_terms, opts.excerpt_length),
            document: doc.clone(),
            score: s.score,
            matched_terms: s.matched_terms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::analyze;

    fn index_of(docs: &[(DocId, &str)]) -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        for (id, text) in docs {
            let a = analyze(text);
            idx.merge(*id, &a.tokens, &a.terms);
        }
        idx
    }

    fn terms(q: &str) -> BTreeSet<String> { analyze(q).terms }

    #[test]
    fn shorter_document_wins_on_density() {
        let idx = index_of(&[
            (0, "kubernetes kubernetes alpha bravo charlie delta echo foxtrot golf hotel"),
            (1, "kubernetes india juliet kilo"),
        ]);
        let ranked = TermFrequencyRanker.rank(&terms("kubernetes"), &idx);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].doc_id, 1);
        assert!((ranked[0].score - 0.25).abs() < 1e-12);
        assert!((ranked[1].score - 0.20).abs() < 1e-12);
    }

    #[test]
    fn matched_terms_and_summed_counts() {
        let idx = index_of(&[(3, "rust tokio rust serde")]);
        let ranked = TermFrequencyRanker.rank(&terms("rust serde missing"), &idx);
        assert_eq!(ranked[0].matched_terms, vec!["rust", "serde"]);
        assert!((ranked[0].score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn equal_scores_order_by_id() {
        let idx = index_of(&[(9, "rust alpha"), (2, "rust bravo"), (5, "rust charlie")]);
        let ids: Vec<DocId> = TermFrequencyRanker.rank(&terms("rust"), &idx).iter().map(|s| s.doc_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn unknown_terms_yield_nothing() {
        let idx = index_of(&[(0, "rust alpha")]);
        assert!(TermFrequencyRanker.rank(&terms("haskell"), &idx).is_empty());
    }
}
