use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use time::OffsetDateTime;

pub type DocId = u32;
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Characters of content that take part in the dedup key of notes and other documents.
const KEY_CONTENT_PREFIX: usize = 100;

/// Open document type tag. Known kinds get their own variant, anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    Cv,
    JobPosting,
    Note,
    Other(String),
}

impl DocType {
    pub fn as_str(&self) -> &str {
        match self {
            DocType::Cv => "cv",
            DocType::JobPosting => "job_posting",
            DocType::Note => "note",
            DocType::Other(s) => s,
        }
    }
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "cv" => DocType::Cv,
            "job_posting" => DocType::JobPosting,
            "note" => DocType::Note,
            _ => DocType::Other(s),
        }
    }
}

impl From<&str> for DocType {
    fn from(s: &str) -> Self { DocType::from(s.to_string()) }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self { t.as_str().to_string() }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    pub source: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub metadata: Metadata,
    /// SHA-1 of the type-specific identity key; empty in records written before it existed.
    #[serde(default)]
    pub dedup_key: String,
}

impl Document {
    /// Text that feeds the index: title and content are both searchable.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }

    pub fn compute_dedup_key(&self) -> String {
        dedup_key(&self.doc_type, &self.title, &self.content, &self.metadata)
    }
}

/// A document as handed to ingestion, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub doc_type: DocType,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_source() -> String { "user_input".to_string() }

impl NewDocument {
    pub fn new(content: impl Into<String>, title: impl Into<String>, doc_type: impl Into<DocType>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            doc_type: doc_type.into(),
            source: default_source(),
            tags: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn cv(text: impl Into<String>, title: impl Into<String>) -> Self {
        let mut doc = Self::new(text, title, DocType::Cv)
            .with_source("user_upload")
            .with_tags(["cv", "profile", "experience"]);
        doc.metadata.insert("version".into(), "1.0".into());
        doc
    }

    pub fn job_posting(text: impl Into<String>, company: &str, title: &str) -> Self {
        let company_tag = company.to_lowercase().replace(' ', "_");
        let mut doc = Self::new(text, format!("{title} at {company}"), DocType::JobPosting)
            .with_tags(["job".to_string(), "opportunity".to_string(), company_tag]);
        doc.metadata.insert("company".into(), company.into());
        doc.metadata.insert("title".into(), title.into());
        doc
    }

    /// A personal note; an empty tag list falls back to `["note"]`.
    pub fn note<I, S>(text: impl Into<String>, title: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let doc = Self::new(text, title, DocType::Note).with_tags(tags);
        if doc.tags.is_empty() { doc.with_tags(["note"]) } else { doc }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn dedup_key(&self) -> String {
        dedup_key(&self.doc_type, &self.title, &self.content, &self.metadata)
    }

    pub(crate) fn into_document(self, id: DocId, created_at: OffsetDateTime, updated_at: OffsetDateTime) -> Document {
        let dedup_key = self.dedup_key();
        Document {
            id,
            title: self.title,
            content: self.content,
            doc_type: self.doc_type,
            source: self.source,
            tags: self.tags,
            created_at,
            updated_at,
            metadata: self.metadata,
            dedup_key,
        }
    }
}

/// Partial replacement of a stored document. `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub metadata: Option<Metadata>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.metadata.is_none()
    }

    pub(crate) fn apply(self, doc: &mut Document) {
        if let Some(title) = self.title { doc.title = title; }
        if let Some(content) = self.content { doc.content = content; }
        if let Some(tags) = self.tags { doc.tags = tags; }
        if let Some(metadata) = self.metadata { doc.metadata = metadata; }
        doc.dedup_key = doc.compute_dedup_key();
    }
}

/// Identity key per document type: full text for CVs, company + title for job
/// postings, title + content prefix for everything else.
pub fn dedup_key(doc_type: &DocType, title: &str, content: &str, metadata: &Metadata) -> String {
    let key = match doc_type {
        DocType::Cv => content.to_string(),
        DocType::JobPosting => {
            let company = metadata.get("company").and_then(|v| v.as_str());
            let role = metadata.get("title").and_then(|v| v.as_str());
            match (company, role) {
                (Some(c), Some(r)) => format!("{c}{r}"),
                _ => title.to_string(),
            }
        }
        _ => {
            let prefix: String = content.chars().take(KEY_CONTENT_PREFIX).collect();
            format!("{title}{prefix}")
        }
    };
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
