use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Author names by document id, backed by a remote lookup endpoint and a
/// JSON file of earlier answers.
pub struct AuthorDirectory {
    client: Client,
    endpoint: String,
    path: PathBuf,
    // keyed by the decimal id, matching the file format
    known: RwLock<BTreeMap<String, String>>,
    // one writer at a time, each renaming a complete file into place
    persist_lock: Mutex<()>,
}

impl AuthorDirectory {
    pub fn load<P: AsRef<Path>>(path: P, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let known = read_known(&path);
        tracing::info!(path = %path.display(), entries = known.len(), "loaded author cache");
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into(), path, known: RwLock::new(known), persist_lock: Mutex::new(()) })
    }

    /// Cached author for `id`, otherwise ask the endpoint. Lookup failures give `None`.
    pub async fn author_for(&self, id: i64) -> Option<String> {
        let key = id.to_string();
        let cached = self.known.read().get(&key).cloned();
        if cached.is_some() {
            return cached;
        }
        match self.fetch(id).await {
            Ok(Some(author)) => {
                self.known.write().insert(key, author.clone());
                Some(author)
            }
            Ok(None) => {
                tracing::debug!(id, "author endpoint returned no author");
                None
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "author lookup failed");
                None
            }
        }
    }

    async fn fetch(&self, id: i64) -> Result<Option<String>> {
        tracing::debug!(endpoint = %self.endpoint, id, "requesting author");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "book_id": id }))
            .send()
            .await?;
        let body: Value = resp.error_for_status()?.json().await?;
        Ok(body
            .get("author")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .map(str::to_string))
    }

    /// Write every known author back to the cache file.
    pub fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let snapshot = self.known.read().clone();
        let dir = match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&snapshot)?.as_bytes())?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

fn read_known(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }
    match fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|s| Ok(serde_json::from_str(&s)?)) {
        Ok(known) => known,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "author cache unreadable, starting empty");
            BTreeMap::new()
        }
    }
}
