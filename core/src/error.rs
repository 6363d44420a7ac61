//! Typed errors for the knowledge base.
//!
//! Persistence failures are kept distinct from lookup and policy failures so
//! callers can tell "not saved yet" apart from "never happened".

use crate::DocId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus file {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The mutation is live in memory but was not written to disk.
    #[error("document {id} is indexed but not durable: {source}")]
    NotDurable {
        id: DocId,
        #[source]
        source: Box<KbError>,
    },

    #[error("document {0} not found")]
    NotFound(DocId),

    #[error("duplicate of existing document {existing}")]
    Duplicate { existing: DocId },

    #[error("document id space exhausted")]
    IdsExhausted,

    #[error("invalid configuration: {details}")]
    Config { details: String },
}

impl KbError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KbError::Io { path: path.into(), source }
    }

    /// True when the failure only concerns durability; in-memory state is intact.
    pub fn is_not_durable(&self) -> bool {
        matches!(self, KbError::NotDurable { .. })
    }
}

pub type Result<T> = std::result::Result<T, KbError>;
