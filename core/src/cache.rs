use crate::rank::Ranking;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Lowercased query text to its ranking.
pub type QueryCache = BTreeMap<String, Ranking>;

/// Storage for query rankings.
///
/// Entries never expire. They stay valid only while the corpus they index
/// into is unchanged; clear the storage when the corpus changes.
pub trait CacheRepository: Send + Sync {
    fn load(&self) -> Result<QueryCache>;

    fn save(&self, cache: &QueryCache) -> Result<()>;

    fn lookup(&self, key: &str) -> Result<Option<Ranking>> {
        Ok(self.load()?.get(key).cloned())
    }

    /// Read the whole cache, set one entry and write it all back.
    fn record(&self, key: &str, ranking: &Ranking) -> Result<()> {
        let mut cache = self.load()?;
        cache.insert(key.to_string(), ranking.clone());
        self.save(&cache)
    }
}

/// The whole cache as one pretty-printed JSON object.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Remove the cache file. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(&self.path, e)),
        }
    }
}

impl CacheRepository for JsonFileCache {
    fn load(&self) -> Result<QueryCache> {
        if !self.path.exists() {
            return Ok(QueryCache::new());
        }
        let what = format!("query cache {}", self.path.display());
        let mut f = File::open(&self.path).map_err(|e| Error::unavailable(&what, e))?;
        let mut buf = String::new();
        f.read_to_string(&mut buf).map_err(|e| Error::unavailable(&what, e))?;
        serde_json::from_str(&buf).map_err(|e| Error::unavailable(&what, e))
    }

    /// Staged in a sibling temp file and renamed over the cache.
    fn save(&self, cache: &QueryCache) -> Result<()> {
        let dir = match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| Error::persistence(&self.path, e))?;
        let mut bytes = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        cache.serialize(&mut ser).map_err(|e| Error::persistence(&self.path, e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(&self.path, e))?;
        tmp.write_all(&bytes).map_err(|e| Error::persistence(&self.path, e))?;
        tmp.persist(&self.path).map_err(|e| Error::persistence(&self.path, e))?;
        Ok(())
    }
}

/// One `sled` key per query, rankings encoded with `bincode`.
///
/// `lookup` and `record` touch a single key, so writers for different
/// queries never overwrite each other.
pub struct SledCache {
    path: PathBuf,
    db: sled::Db,
}

impl SledCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)
            .map_err(|e| Error::unavailable(format!("query cache {}", path.display()), e))?;
        Ok(Self { path, db })
    }

    fn unavailable(&self, reason: impl ToString) -> Error {
        Error::unavailable(format!("query cache {}", self.path.display()), reason)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Ranking> {
        bincode::deserialize(bytes).map_err(|e| self.unavailable(e))
    }
}

impl CacheRepository for SledCache {
    fn load(&self) -> Result<QueryCache> {
        let mut cache = QueryCache::new();
        for item in self.db.iter() {
            let (k, v) = item.map_err(|e| self.unavailable(e))?;
            let key = String::from_utf8(k.to_vec()).map_err(|e| self.unavailable(e))?;
            cache.insert(key, self.decode(&v)?);
        }
        Ok(cache)
    }

    fn save(&self, cache: &QueryCache) -> Result<()> {
        let mut batch = sled::Batch::default();
        for item in self.db.iter().keys() {
            let k = item.map_err(|e| Error::persistence(&self.path, e))?;
            batch.remove(k);
        }
        for (key, ranking) in cache {
            let bytes = bincode::serialize(ranking).map_err(|e| Error::persistence(&self.path, e))?;
            batch.insert(key.as_bytes(), bytes);
        }
        self.db.apply_batch(batch).map_err(|e| Error::persistence(&self.path, e))?;
        self.db.flush().map_err(|e| Error::persistence(&self.path, e))?;
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<Ranking>> {
        match self.db.get(key.as_bytes()).map_err(|e| self.unavailable(e))? {
            Some(v) => Ok(Some(self.decode(&v)?)),
            None => Ok(None),
        }
    }

    fn record(&self, key: &str, ranking: &Ranking) -> Result<()> {
        let bytes = bincode::serialize(ranking).map_err(|e| Error::persistence(&self.path, e))?;
        self.db.insert(key.as_bytes(), bytes).map_err(|e| Error::persistence(&self.path, e))?;
        self.db.flush().map_err(|e| Error::persistence(&self.path, e))?;
        Ok(())
    }
}

/// Process-local cache, nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: RwLock<QueryCache>,
}

impl MemoryCache {
    pub fn new() -> Self { Self::default() }
}

impl CacheRepository for MemoryCache {
    fn load(&self) -> Result<QueryCache> { Ok(self.inner.read().clone()) }

    fn save(&self, cache: &QueryCache) -> Result<()> {
        *self.inner.write() = cache.clone();
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<Ranking>> { Ok(self.inner.read().get(key).cloned()) }

    fn record(&self, key: &str, ranking: &Ranking) -> Result<()> {
        self.inner.write().insert(key.to_string(), ranking.clone());
        Ok(())
    }
}
