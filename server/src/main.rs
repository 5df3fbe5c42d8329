use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use summary_server::{build_app, open_log_file, CacheBackend, ServerConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Corpus file with a top-level "summaries" array
    #[arg(long, default_value = "./data/input.json")]
    corpus: PathBuf,
    /// Query ranking cache [default: ./data/cache.json, or ./data/cache.sled for sled]
    #[arg(long)]
    cache: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CacheBackend::Json)]
    cache_backend: CacheBackend,
    /// Persisted id -> author answers
    #[arg(long, default_value = "./data/request_cache.json")]
    author_cache: PathBuf,
    /// Endpoint answering {"book_id": id} with {"author": name}
    #[arg(long, default_value = "https://ie4djxzt8j.execute-api.eu-west-1.amazonaws.com/coding")]
    author_endpoint: String,
    #[arg(long, default_value_t = 10)]
    author_timeout_secs: u64,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,
    /// Append logs to search_engine.log in this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match &args.log_dir {
        Some(dir) => {
            let file = open_log_file(dir)?;
            fmt().with_env_filter(filter).with_ansi(false).with_writer(std::sync::Mutex::new(file)).init();
        }
        None => fmt().with_env_filter(filter).init(),
    }

    let config = ServerConfig {
        corpus_path: args.corpus,
        cache_path: args.cache.unwrap_or_else(|| args.cache_backend.default_path()),
        cache_backend: args.cache_backend,
        author_cache_path: args.author_cache,
        author_endpoint: args.author_endpoint,
        author_timeout: Duration::from_secs(args.author_timeout_secs),
    };
    let app: Router = build_app(&config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
