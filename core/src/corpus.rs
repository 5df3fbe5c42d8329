use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub summary: String,
    /// Any other fields of the source entry, passed through to results unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn new(id: i64, summary: impl Into<String>) -> Self {
        Self { id, summary: summary.into(), extra: Map::new() }
    }

    /// Flatten into a JSON object, then write `overrides` over it.
    pub fn merged(&self, overrides: &Map<String, Value>) -> Map<String, Value> {
        let mut out = self.extra.clone();
        out.insert("id".into(), Value::from(self.id));
        out.insert("summary".into(), Value::String(self.summary.clone()));
        for (k, v) in overrides {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

#[derive(Deserialize)]
struct CorpusFile {
    summaries: Vec<Document>,
}

/// Immutable, load-once set of summary documents.
///
/// Indices handed out by the ranker (and stored in the query cache) are
/// positions in load order. Cached rankings are only meaningful while the
/// loaded documents stay the same.
#[derive(Debug, Default)]
pub struct CorpusStore {
    docs: OnceLock<Vec<Document>>,
}

impl CorpusStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_documents(docs: Vec<Document>) -> Self {
        let store = Self::new();
        let _ = store.docs.set(docs);
        store
    }

    /// Load `{"summaries": [...]}` from `path` unless the store is already populated.
    ///
    /// On failure the store stays empty and a later call may try again.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        if let Some(docs) = self.docs.get() {
            return Ok(docs.len());
        }
        let path = path.as_ref();
        let docs = read_corpus(path)?;
        let count = docs.len();
        if self.docs.set(docs).is_err() {
            tracing::debug!(path = %path.display(), "corpus already loaded by another caller");
            return Ok(self.count());
        }
        tracing::info!(path = %path.display(), count, "loaded corpus");
        Ok(count)
    }

    pub fn is_loaded(&self) -> bool { self.docs.get().is_some() }

    pub fn documents(&self) -> &[Document] {
        self.docs.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self) -> usize { self.documents().len() }

    pub fn document_at(&self, index: usize) -> Result<&Document> {
        let docs = self.documents();
        docs.get(index).ok_or(Error::IndexOutOfRange { index, count: docs.len() })
    }
}

fn read_corpus(path: &Path) -> Result<Vec<Document>> {
    let what = format!("corpus {}", path.display());
    let mut f = File::open(path).map_err(|e| Error::unavailable(&what, e))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| Error::unavailable(&what, e))?;
    let file: CorpusFile = serde_json::from_str(&buf).map_err(|e| Error::unavailable(&what, e))?;
    Ok(file.summaries)
}
