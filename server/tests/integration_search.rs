use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{routing::post, Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use summary_core::{CacheRepository, CorpusStore, Document, MemoryCache, QueryCache, Ranker};
use summary_server::author::AuthorDirectory;
use summary_server::{build_app, router, AppState, CacheBackend, ServerConfig};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tower::ServiceExt;

fn write_corpus(dir: &Path) {
    let corpus = json!({
        "summaries": [
            { "id": 1, "summary": "the cat sat" },
            { "id": 2, "summary": "the dog ran" },
            { "id": 3, "summary": "cat and dog play", "title": "Play" },
        ]
    });
    fs::write(dir.join("input.json"), corpus.to_string()).unwrap();
}

/// Author endpoint stub: "Author <id>" for every id except 2, which has none.
async fn spawn_author_stub() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/author",
        post(move |Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                match body["book_id"].as_i64() {
                    Some(2) | None => Json(json!({})),
                    Some(id) => Json(json!({ "author": format!("Author {id}") })),
                }
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/author"), calls)
}

fn config(dir: &Path, endpoint: String, backend: CacheBackend) -> ServerConfig {
    ServerConfig {
        corpus_path: dir.join("input.json"),
        cache_path: dir.join(if backend == CacheBackend::Json { "cache.json" } else { "cache.sled" }),
        cache_backend: backend,
        author_cache_path: dir.join("request_cache.json"),
        author_endpoint: endpoint,
        author_timeout: Duration::from_secs(5),
    }
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_summaries(app: Router, body: &str) -> (StatusCode, Value) {
    // no content type, the handler reads the body as JSON regardless
    let req = Request::post("/api/v1/get-matching-summaries").body(Body::from(body.to_string())).unwrap();
    call(app, req).await
}

#[tokio::test]
async fn ping_reports_success() {
    let dir = tempdir().unwrap();
    write_corpus(dir.path());
    let (endpoint, _) = spawn_author_stub().await;
    let app = build_app(&config(dir.path(), endpoint, CacheBackend::Json)).unwrap();

    let (status, json) = call(app, Request::get("/ping").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "status": "success" }));
}

#[tokio::test]
async fn matching_summaries_are_ranked_and_enriched() {
    let dir = tempdir().unwrap();
    write_corpus(dir.path());
    let (endpoint, calls) = spawn_author_stub().await;
    let app = build_app(&config(dir.path(), endpoint, CacheBackend::Json)).unwrap();

    let (status, json) = post_summaries(app.clone(), r#"{"queries": ["cat dog", "Dog"], "K": 2}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "books": [
                [
                    { "id": 3, "summary": "cat and dog play", "title": "Play", "query": "cat dog", "author": "Author 3" },
                    { "id": 1, "summary": "the cat sat", "query": "cat dog", "author": "Author 1" },
                ],
                [
                    { "id": 2, "summary": "the dog ran", "query": "Dog", "author": null },
                    { "id": 3, "summary": "cat and dog play", "title": "Play", "query": "Dog", "author": "Author 3" },
                ],
            ]
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let cache: Value = serde_json::from_str(&fs::read_to_string(dir.path().join("cache.json")).unwrap()).unwrap();
    assert_eq!(cache, json!({ "cat dog": [2, 0, 1], "dog": [1, 2] }));
    let authors: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("request_cache.json")).unwrap()).unwrap();
    assert_eq!(authors, json!({ "1": "Author 1", "3": "Author 3" }));

    // Same request again: rankings and known authors come from the caches.
    let (_, again) = post_summaries(app, r#"{"queries": ["cat dog", "Dog"], "K": 2}"#).await;
    assert_eq!(again, json);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn limits_and_missing_fields() {
    let dir = tempdir().unwrap();
    write_corpus(dir.path());
    let (endpoint, _) = spawn_author_stub().await;
    let app = build_app(&config(dir.path(), endpoint, CacheBackend::Sled)).unwrap();

    let (status, json) = post_summaries(app.clone(), r#"{"queries": ["cat", ""], "K": 0}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "books": [[], []] }));

    let (_, json) = post_summaries(app.clone(), r#"{"K": 3}"#).await;
    assert_eq!(json, json!({ "books": [] }));

    let (_, json) = post_summaries(app, r#"{"queries": ["the"]}"#).await;
    assert_eq!(json, json!({ "books": [[]] }));
}

#[tokio::test]
async fn invalid_body_is_rejected() {
    let dir = tempdir().unwrap();
    write_corpus(dir.path());
    let (endpoint, _) = spawn_author_stub().await;
    let app = build_app(&config(dir.path(), endpoint, CacheBackend::Json)).unwrap();

    let (status, json) = post_summaries(app, "queries=cat").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn missing_corpus_serves_empty_results() {
    let dir = tempdir().unwrap();
    let (endpoint, calls) = spawn_author_stub().await;
    let app = build_app(&config(dir.path(), endpoint, CacheBackend::Json)).unwrap();

    let (status, json) = post_summaries(app, r#"{"queries": ["cat"], "K": 5}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "books": [[]] }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Cache whose every load takes a while, standing in for a slow disk.
struct SlowCache {
    inner: MemoryCache,
    delay: Duration,
}

impl CacheRepository for SlowCache {
    fn load(&self) -> summary_core::Result<QueryCache> {
        std::thread::sleep(self.delay);
        self.inner.load()
    }

    fn save(&self, cache: &QueryCache) -> summary_core::Result<()> {
        self.inner.save(cache)
    }
}

#[tokio::test]
async fn slow_ranking_does_not_stall_the_runtime() {
    let dir = tempdir().unwrap();
    let corpus = Arc::new(CorpusStore::from_documents(vec![Document::new(1, "the cat sat")]));
    let cache = Arc::new(SlowCache { inner: MemoryCache::new(), delay: Duration::from_millis(100) });
    let authors = AuthorDirectory::load(
        dir.path().join("request_cache.json"),
        "http://127.0.0.1:9/author",
        Duration::from_millis(200),
    )
    .unwrap();
    let app = router(AppState { ranker: Arc::new(Ranker::new(corpus, cache)), authors: Arc::new(authors) });

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // both queries miss: lookup and record each load the cache, ~400ms in total
    let (status, json) = post_summaries(app, r#"{"queries": ["dog", "bird"], "K": 1}"#).await;
    ticker.abort();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "books": [[], []] }));
    assert!(ticks.load(Ordering::SeqCst) >= 10, "runtime stalled: {} ticks", ticks.load(Ordering::SeqCst));
}
