pub mod author;

use anyhow::Result;
use author::AuthorDirectory;
use axum::{body::Bytes, extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use summary_core::{CacheRepository, CorpusStore, ExtraFields, Hit, JsonFileCache, Ranker, SledCache};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheBackend {
    /// Whole cache rewritten as one JSON file on every miss
    Json,
    /// Embedded sled tree, one key per query
    Sled,
}

impl CacheBackend {
    /// Where the cache lives when no path is given: a file for json, a directory for sled.
    pub fn default_path(self) -> PathBuf {
        match self {
            CacheBackend::Json => PathBuf::from("./data/cache.json"),
            CacheBackend::Sled => PathBuf::from("./data/cache.sled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub corpus_path: PathBuf,
    pub cache_path: PathBuf,
    pub cache_backend: CacheBackend,
    pub author_cache_path: PathBuf,
    pub author_endpoint: String,
    pub author_timeout: Duration,
}

#[derive(Deserialize)]
pub struct SummariesRequest {
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(rename = "K", default)]
    pub k: i64,
}

#[derive(Serialize)]
pub struct SummariesResponse {
    pub books: Vec<Vec<Hit>>,
}

#[derive(Clone)]
pub struct AppState {
    pub ranker: Arc<Ranker>,
    pub authors: Arc<AuthorDirectory>,
}

pub const LOG_FILE: &str = "search_engine.log";

/// Open `LOG_FILE` under `dir` for appending, creating both as needed.
pub fn open_log_file(dir: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(dir.join(LOG_FILE))
}

pub fn build_app(config: &ServerConfig) -> Result<Router> {
    // A missing corpus is not fatal: every query then ranks over zero documents.
    let corpus = Arc::new(CorpusStore::new());
    if let Err(e) = corpus.load(&config.corpus_path) {
        tracing::error!(error = %e, "corpus not loaded, serving empty results");
    }
    let cache: Arc<dyn CacheRepository> = match config.cache_backend {
        CacheBackend::Json => Arc::new(JsonFileCache::new(&config.cache_path)),
        CacheBackend::Sled => Arc::new(SledCache::open(&config.cache_path)?),
    };
    let authors = AuthorDirectory::load(&config.author_cache_path, config.author_endpoint.clone(), config.author_timeout)?;
    let state = AppState { ranker: Arc::new(Ranker::new(corpus, cache)), authors: Arc::new(authors) };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/ping", get(|| async { Json(json!({ "status": "success" })) }))
        .route("/api/v1/get-matching-summaries", post(matching_summaries))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Rank every query, stamp each hit with its query and author.
///
/// The body is read as JSON whatever its content type.
pub async fn matching_summaries(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SummariesResponse>, (StatusCode, Json<Value>)> {
    let req: SummariesRequest = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;
    tracing::info!(queries = ?req.queries, k = req.k, "matching summaries requested");

    let mut books = Vec::with_capacity(req.queries.len());
    for query in &req.queries {
        let mut extra = ExtraFields::new();
        extra.insert("query".into(), Value::String(query.clone()));
        let ranker = Arc::clone(&state.ranker);
        let (q, k) = (query.clone(), req.k);
        // ranking takes the cache lock, does file I/O and scans the corpus
        let outcome = tokio::task::spawn_blocking(move || ranker.rank(&q, k, &extra))
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?;
        let mut hits = outcome.hits;
        for hit in hits.iter_mut() {
            let author = match hit.get("id").and_then(Value::as_i64) {
                Some(id) => state.authors.author_for(id).await,
                None => None,
            };
            hit.insert("author".into(), author.map(Value::String).unwrap_or(Value::Null));
        }
        books.push(hits);
    }

    let authors = Arc::clone(&state.authors);
    match tokio::task::spawn_blocking(move || authors.persist()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "failed to persist author cache"),
        Err(e) => tracing::error!(error = %e, "author cache persist task failed"),
    }
    tracing::debug!(results = books.len(), "matching summaries answered");
    Ok(Json(SummariesResponse { books }))
}
