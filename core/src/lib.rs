//! Lexical knowledge base: tokenizer, document store, inverted index with a
//! term-frequency table, ranked search with excerpts, and JSON persistence.

pub mod config;
pub mod document;
pub mod error;
pub mod excerpt;
pub mod index;
pub mod knowledge_base;
pub mod persist;
pub mod search;
pub mod store;
pub mod tokenizer;

pub use config::Config;
pub use document::{DocId, DocType, Document, DocumentPatch, Metadata, NewDocument};
pub use error::{KbError, Result};
pub use index::InvertedIndex;
pub use knowledge_base::{ImportReport, KnowledgeBase, Stats};
pub use search::{RankingStrategy, ScoredDoc, SearchHit, SearchOptions, SearchResult, TermFrequencyRanker};
pub use store::{DocumentStore, DuplicatePolicy};
