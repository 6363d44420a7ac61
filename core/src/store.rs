use crate::document::{DocId, DocType, Document, DocumentPatch, NewDocument};
use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;

/// What to do when an ingest carries the dedup key of a live document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Overwrite in place: same id, original `created_at`.
    #[default]
    Replace,
    /// Fail with `KbError::Duplicate`.
    Reject,
    /// Keep the old document and add the new one under a fresh id.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub id: DocId,
    pub replaced: bool,
}

/// Canonical owner of all documents. Ids come from a monotonic counter and are
/// never reused; duplicate detection goes through a separate content-key map.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: BTreeMap<DocId, Document>,
    dedup: HashMap<String, DocId>,
    next_id: DocId,
    pub(crate) updated_at: Option<OffsetDateTime>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(
        &mut self,
        new: NewDocument,
        policy: DuplicatePolicy,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Result<Ingested> {
        let key = new.dedup_key();
        if let Some(&existing) = self.dedup.get(&key) {
            match policy {
                DuplicatePolicy::Reject => return Err(KbError::Duplicate { existing }),
                DuplicatePolicy::Replace => {
                    let created = self.docs.get(&existing).map(|d| d.created_at).unwrap_or(created_at);
                    self.docs.insert(existing, new.into_document(existing, created, updated_at));
                    return Ok(Ingested { id: existing, replaced: true });
                }
                DuplicatePolicy::Version => {}
            }
        }
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(KbError::IdsExhausted)?;
        self.docs.insert(id, new.into_document(id, created_at, updated_at));
        self.dedup.insert(key, id);
        Ok(Ingested { id, replaced: false })
    }

    /// Put back a previously persisted document as-is.
    pub fn restore(&mut self, mut doc: Document) {
        if doc.dedup_key.is_empty() {
            doc.dedup_key = doc.compute_dedup_key();
        }
        self.next_id = self.next_id.max(doc.id.saturating_add(1));
        self.dedup.insert(doc.dedup_key.clone(), doc.id);
        self.docs.insert(doc.id, doc);
    }

    pub fn update(&mut self, id: DocId, patch: DocumentPatch, now: OffsetDateTime) -> Result<&Document> {
        let doc = self.docs.get_mut(&id).ok_or(KbError::NotFound(id))?;
        let old_key = doc.dedup_key.clone();
        patch.apply(doc);
        doc.updated_at = now;
        let new_key = doc.dedup_key.clone();
        if new_key != old_key {
            self.forget_key(&old_key, id);
            self.dedup.insert(new_key, id);
        }
        Ok(&self.docs[&id])
    }

    pub fn remove(&mut self, id: DocId) -> Option<Document> {
        let doc = self.docs.remove(&id)?;
        self.forget_key(&doc.dedup_key, id);
        Some(doc)
    }

    /// Unlink `key` from `id`, handing it to the newest remaining version if any.
    fn forget_key(&mut self, key: &str, id: DocId) {
        if self.dedup.get(key) != Some(&id) {
            return;
        }
        self.dedup.remove(key);
        if let Some(prev) = self.docs.values().rev().find(|d| d.dedup_key == key) {
            self.dedup.insert(key.to_string(), prev.id);
        }
    }

    pub fn get(&self, id: DocId) -> Option<&Document> { self.docs.get(&id) }

    pub fn find_by_key(&self, key: &str) -> Option<DocId> { self.dedup.get(key).copied() }

    /// Documents of one type in id (insertion) order.
    pub fn by_type<'a>(&'a self, doc_type: &'a DocType) -> impl Iterator<Item = &'a Document> + 'a {
        self.docs.values().filter(move |d| &d.doc_type == doc_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> { self.docs.values() }

    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        let mut by_type = BTreeMap::new();
        for doc in self.docs.values() {
            *by_type.entry(doc.doc_type.to_string()).or_insert(0) += 1;
        }
        by_type
    }

    pub fn next_id(&self) -> DocId { self.next_id }

    pub(crate) fn reserve_ids_from(&mut self, next_id: DocId) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn updated_at(&self) -> Option<OffsetDateTime> { self.updated_at }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }
}
