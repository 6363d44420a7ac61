//! Whole-corpus JSON persistence. Only documents are written; the inverted
//! index and frequency table are rebuilt from them on load.

use crate::document::{DocId, Document};
use crate::error::{KbError, Result};
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, rename, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const CORPUS_FILE: &str = "knowledge_base.json";

pub struct CorpusPaths {
    pub root: PathBuf,
}

impl CorpusPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn corpus(&self) -> PathBuf { self.root.join(CORPUS_FILE) }
}

#[derive(Serialize)]
struct CorpusRecord<'a> {
    documents: Vec<&'a Document>,
    #[serde(with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
    next_id: DocId,
}

/// On-disk corpus as read back.
#[derive(Debug, Deserialize)]
pub struct CorpusFile {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub next_id: DocId,
}

/// Export snapshot: the corpus plus a stats block. Never contains index data.
#[derive(Serialize)]
pub struct ExportRecord<'a, S: Serialize> {
    #[serde(with = "time::serde::rfc3339")]
    pub export_date: OffsetDateTime,
    pub stats: &'a S,
    pub documents: Vec<&'a Document>,
}

/// Anything with a `documents` array: exports and raw corpus files alike.
#[derive(Deserialize)]
struct DocumentsOnly {
    documents: Vec<Document>,
}

pub fn save_corpus(paths: &CorpusPaths, store: &DocumentStore) -> Result<()> {
    let record = CorpusRecord {
        documents: store.iter().collect(),
        updated_at: store.updated_at(),
        next_id: store.next_id(),
    };
    let json = serde_json::to_vec_pretty(&record)?;
    write_atomic(&paths.corpus(), &json)
}

/// Read the corpus file. A missing file is a fresh corpus, not an error.
pub fn load_corpus(paths: &CorpusPaths) -> Result<Option<CorpusFile>> {
    let path = paths.corpus();
    let Some(buf) = read_if_exists(&path)? else { return Ok(None) };
    let corpus = serde_json::from_slice(&buf).map_err(|source| KbError::Corrupt { path, source })?;
    Ok(Some(corpus))
}

pub fn save_export<S: Serialize>(path: &Path, stats: &S, store: &DocumentStore) -> Result<()> {
    let record = ExportRecord {
        export_date: OffsetDateTime::now_utc(),
        stats,
        documents: store.iter().collect(),
    };
    let json = serde_json::to_vec_pretty(&record)?;
    write_atomic(path, &json)
}

pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let buf = read_if_exists(path)?
        .ok_or_else(|| KbError::io(path, std::io::Error::from(ErrorKind::NotFound)))?;
    let parsed: DocumentsOnly =
        serde_json::from_slice(&buf).map_err(|source| KbError::Corrupt { path: path.to_path_buf(), source })?;
    Ok(parsed.documents)
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(KbError::io(path, e)),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| KbError::io(path, e))?;
    Ok(Some(buf))
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir).map_err(|e| KbError::io(dir, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut f = File::create(&tmp).map_err(|e| KbError::io(&tmp, e))?;
    f.write_all(bytes).map_err(|e| KbError::io(&tmp, e))?;
    f.sync_all().map_err(|e| KbError::io(&tmp, e))?;
    rename(&tmp, path).map_err(|e| KbError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NewDocument;
    use crate::store::DuplicatePolicy;

    #[test]
    fn missing_corpus_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_corpus(&CorpusPaths::new(dir.path())).unwrap().is_none());
    }

    #[test]
    fn malformed_corpus_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CORPUS_FILE), b"{ not json").unwrap();
        let err = load_corpus(&CorpusPaths::new(dir.path())).unwrap_err();
        assert!(matches!(err, KbError::Corrupt { .. }));
    }

    #[test]
    fn save_writes_documents_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorpusPaths::new(dir.path().join("nested"));
        let now = OffsetDateTime::now_utc();
        let mut store = DocumentStore::new();
        store.insert(NewDocument::cv("rust engineer", "CV"), DuplicatePolicy::Replace, now, now).unwrap();
        store.updated_at = Some(now);
        save_corpus(&paths, &store).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(paths.corpus()).unwrap()).unwrap();
        assert_eq!(raw["next_id"], 1);
        assert_eq!(raw["documents"][0]["doc_type"], "cv");
        assert!(raw["updated_at"].is_string());
        assert!(!paths.root.join("knowledge_base.json.tmp").exists());

        let back = load_corpus(&paths).unwrap().unwrap();
        assert_eq!(back.documents.len(), 1);
        assert_eq!(back.next_id, 1);
    }
}
