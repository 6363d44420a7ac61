use crate::config::Config;
use crate::document::{DocId, DocType, Document, DocumentPatch, Metadata, NewDocument};
use crate::error::{KbError, Result};
use crate::index::InvertedIndex;
use crate::persist::{self, CorpusPaths};
use crate::search::{self, RankingStrategy, SearchOptions, SearchResult, TermFrequencyRanker};
use crate::store::{DocumentStore, DuplicatePolicy, Ingested};
use crate::tokenizer::analyze;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_documents: usize,
    pub by_type: BTreeMap<String, usize>,
    pub unique_terms: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub replaced: usize,
    pub skipped: usize,
}

/// Store and derived index, always mutated together.
#[derive(Default)]
struct Corpus {
    store: DocumentStore,
    index: InvertedIndex,
}

impl Corpus {
    fn reindex(&mut self, id: DocId) {
        match self.store.get(id) {
            Some(doc) => {
                let analyzed = analyze(&doc.indexed_text());
                self.index.merge(id, &analyzed.tokens, &analyzed.terms);
            }
            None => {
                self.index.remove(id);
            }
        }
    }

    fn insert(&mut self, new: NewDocument, policy: DuplicatePolicy, created: OffsetDateTime, updated: OffsetDateTime) -> Result<Ingested> {
        let ingested = self.store.insert(new, policy, created, updated)?;
        self.reindex(ingested.id);
        Ok(ingested)
    }
}

/// Handle to one knowledge base on disk. Construct with [`KnowledgeBase::open`]
/// and share behind an `Arc`; call [`KnowledgeBase::flush`] at shutdown.
///
/// Mutations are serialized by `writer` and applied under the state write lock.
/// The guard is downgraded before the corpus is written, so searches run during
/// persistence but never see a half-applied update.
pub struct KnowledgeBase {
    config: Config,
    paths: CorpusPaths,
    ranker: Box<dyn RankingStrategy>,
    state: RwLock<Corpus>,
    writer: Mutex<()>,
}

impl KnowledgeBase {
    /// Load the corpus from `config.data_dir` and rebuild the index from it.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let paths = CorpusPaths::new(&config.data_dir);
        let mut corpus = Corpus::default();
        if let Some(file) = persist::load_corpus(&paths)? {
            for doc in file.documents {
                let id = doc.id;
                corpus.store.restore(doc);
                corpus.reindex(id);
            }
            corpus.store.reserve_ids_from(file.next_id);
            corpus.store.updated_at = file.updated_at;
        }
        info!(
            path = %paths.corpus().display(),
            documents = corpus.store.len(),
            unique_terms = corpus.index.unique_terms(),
            "knowledge base loaded"
        );
        Ok(Self {
            config,
            paths,
            ranker: Box::new(TermFrequencyRanker),
            state: RwLock::new(corpus),
            writer: Mutex::new(()),
        })
    }

    /// Swap the ranking strategy. Ingestion and stored data are unaffected.
    pub fn with_ranker(mut self, ranker: Box<dyn RankingStrategy>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn corpus_path(&self) -> PathBuf { self.paths.corpus() }

    /// Search options seeded from configuration.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            doc_type: None,
            top_k: self.config.default_top_k,
            excerpt_length: self.config.excerpt_length,
        }
    }

    // --- ingestion ---

    /// Add a document and persist the corpus. If the write fails the document stays
    /// searchable and the error is `KbError::NotDurable`.
    pub fn ingest(&self, new: NewDocument) -> Result<DocId> {
        let policy = self.config.duplicate_policy;
        self.commit(|corpus, now| {
            let doc_type = new.doc_type.clone();
            let ingested = corpus.insert(new, policy, now, now)?;
            debug!(id = ingested.id, %doc_type, replaced = ingested.replaced, "ingested document");
            Ok((ingested.id, ingested.id))
        })
    }

    pub fn ingest_document<I, S>(
        &self,
        content: &str,
        title: &str,
        doc_type: impl Into<DocType>,
        tags: I,
        metadata: Metadata,
    ) -> Result<DocId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingest(NewDocument::new(content, title, doc_type).with_tags(tags).with_metadata(metadata))
    }

    pub fn ingest_cv(&self, text: &str, title: &str) -> Result<DocId> {
        self.ingest(NewDocument::cv(text, title))
    }

    pub fn ingest_job_posting(&self, text: &str, company: &str, title: &str) -> Result<DocId> {
        self.ingest(NewDocument::job_posting(text, company, title))
    }

    pub fn ingest_note<I, S>(&self, text: &str, title: &str, tags: I) -> Result<DocId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingest(NewDocument::note(text, title, tags))
    }

    pub fn update_document(&self, id: DocId, patch: DocumentPatch) -> Result<()> {
        self.commit(|corpus, now| {
            corpus.store.update(id, patch, now)?;
            corpus.reindex(id);
            debug!(id, "updated document");
            Ok((id, ()))
        })
    }

    pub fn delete_document(&self, id: DocId) -> Result<Document> {
        self.commit(|corpus, _| {
            let doc = corpus.store.remove(id).ok_or(KbError::NotFound(id))?;
            corpus.index.remove(id);
            debug!(id, "deleted document");
            Ok((id, doc))
        })
    }

    // --- queries ---

    pub fn search(&self, query: &str, opts: &SearchOptions) -> Vec<SearchResult> {
        let terms = analyze(query).terms;
        let state = self.state.read();
        let results = search::execute(self.ranker.as_ref(), &state.store, &state.index, &terms, opts, None);
        debug!(query, terms = terms.len(), hits = results.len(), ranker = self.ranker.name(), "search");
        results
    }

    /// Rank documents of `target` type against the content of document `id`.
    /// The source document itself is never returned.
    pub fn find_similar(&self, id: DocId, target: &DocType, top_k: usize) -> Vec<SearchResult> {
        let state = self.state.read();
        let Some(source) = state.store.get(id) else { return Vec::new() };
        let terms = analyze(&source.content).terms;
        let opts = SearchOptions { doc_type: Some(target.clone()), top_k, excerpt_length: self.config.excerpt_length };
        search::execute(self.ranker.as_ref(), &state.store, &state.index, &terms, &opts, Some(id))
    }

    pub fn find_similar_jobs(&self, cv_id: DocId, top_k: usize) -> Vec<SearchResult> {
        self.find_similar(cv_id, &DocType::JobPosting, top_k)
    }

    pub fn get(&self, id: DocId) -> Option<Document> { self.state.read().store.get(id).cloned() }

    pub fn get_by_type(&self, doc_type: &DocType) -> Vec<Document> {
        self.state.read().store.by_type(doc_type).cloned().collect()
    }

    pub fn stats(&self) -> Stats {
        let state = self.state.read();
        Stats {
            total_documents: state.store.len(),
            by_type: state.store.counts_by_type(),
            unique_terms: state.index.unique_terms(),
            last_updated: state.store.updated_at(),
        }
    }

    pub fn len(&self) -> usize { self.state.read().store.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    // --- backup ---

    /// Write all documents plus a stats block to `path`. Index data is never exported.
    pub fn export_corpus(&self, path: &Path) -> Result<()> {
        let stats = self.stats();
        let state = self.state.read();
        persist::save_export(path, &stats, &state.store)?;
        info!(path = %path.display(), documents = stats.total_documents, "exported corpus");
        Ok(())
    }

    /// Re-ingest every document of an export (or raw corpus file) under the configured
    /// duplicate policy, keeping original timestamps. The corpus is saved once at the end.
    pub fn import_corpus(&self, path: &Path) -> Result<ImportReport> {
        let documents = persist::load_documents(path)?;
        let policy = self.config.duplicate_policy;
        let report = self.commit(|corpus, _| {
            let mut report = ImportReport::default();
            let mut last = None;
            for doc in documents {
                let (created, updated) = (doc.created_at, doc.updated_at);
                let new = NewDocument {
                    title: doc.title,
                    content: doc.content,
                    doc_type: doc.doc_type,
                    source: doc.source,
                    tags: doc.tags,
                    metadata: doc.metadata,
                };
                match corpus.insert(new, policy, created, updated) {
                    Ok(Ingested { id, replaced: true }) => { report.replaced += 1; last = Some(id); }
                    Ok(Ingested { id, replaced: false }) => { report.imported += 1; last = Some(id); }
                    Err(KbError::Duplicate { .. }) => report.skipped += 1,
                    Err(e) => return Err(e),
                }
            }
            Ok((last.unwrap_or_else(|| corpus.store.next_id()), report))
        })?;
        info!(path = %path.display(), ?report, "imported corpus");
        Ok(report)
    }

    /// Force a full write of the corpus.
    pub fn flush(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let state = self.state.read();
        persist::save_corpus(&self.paths, &state.store)
    }

    /// Apply `op` under the writer section, then persist. `op` returns the id the
    /// change concerns (for error reporting) alongside its output.
    fn commit<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Corpus, OffsetDateTime) -> Result<(DocId, T)>,
    {
        let _writer = self.writer.lock();
        let mut state = self.state.write();
        let now = OffsetDateTime::now_utc();
        let (id, out) = op(&mut *state, now)?;
        state.store.updated_at = Some(now);
        let state = RwLockWriteGuard::downgrade(state);
        if let Err(e) = persist::save_corpus(&self.paths, &state.store) {
            warn!(id, error = %e, "corpus write failed; change is in memory only");
            return Err(KbError::NotDurable { id, source: Box::new(e) });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempDir, KnowledgeBase) {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::open(Config::with_data_dir(dir.path())).unwrap();
        (dir, kb)
    }

    #[test]
    fn update_reindexes_content() {
        let (_dir, kb) = open_tmp();
        let id = kb.ingest_note("legacy cobol mainframe", "Old", ["x"]).unwrap();
        kb.update_document(id, DocumentPatch { content: Some("modern rust services".into()), ..Default::default() })
            .unwrap();
        assert!(kb.search("cobol", &kb.search_options()).is_empty());
        assert_eq!(kb.search("rust", &kb.search_options())[0].document.id, id);
        // "old" is a stopword, so only the new content contributes terms.
        assert_eq!(kb.stats().unique_terms, analyze("Old modern rust services").terms.len());
    }

    #[test]
    fn delete_keeps_index_consistent() {
        let (_dir, kb) = open_tmp();
        let a = kb.ingest_note("shared alpha", "A1", ["x"]).unwrap();
        let b = kb.ingest_note("shared bravo", "B1", ["x"]).unwrap();
        let removed = kb.delete_document(a).unwrap();
        assert_eq!(removed.id, a);
        let hits = kb.search("shared alpha", &kb.search_options());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, b);
        assert!(matches!(kb.delete_document(a), Err(KbError::NotFound(_))));
        assert!(matches!(kb.update_document(a, DocumentPatch::default()), Err(KbError::NotFound(_))));
    }

    #[test]
    fn write_failure_is_not_durable_but_searchable() {
        let (dir, kb) = open_tmp();
        // A directory squatting on the temp file name makes every save fail.
        std::fs::create_dir(dir.path().join("knowledge_base.json.tmp")).unwrap();
        let err = kb.ingest_cv("distributed systems engineer", "CV").unwrap_err();
        assert!(err.is_not_durable());
        assert_eq!(kb.search("distributed", &kb.search_options()).len(), 1);
    }
}
