use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::Map;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use summary_core::{CorpusStore, JsonFileCache, Ranker};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "summary-cli")]
#[command(about = "Rank summaries and manage the query cache offline", long_about = None)]
struct Cli {
    /// Corpus file with a top-level "summaries" array
    #[arg(long, global = true, default_value = "./data/input.json")]
    corpus: PathBuf,
    /// Query ranking cache file
    #[arg(long, global = true, default_value = "./data/cache.json")]
    cache: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the top matches for one query as JSON
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Rank every query in a file (one per line) so later requests hit the cache
    Warm {
        #[arg(long)]
        queries: PathBuf,
    },
    /// Delete the cache file, e.g. after the corpus changed
    ClearCache,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search { query, limit } => {
            let ranker = open_ranker(&cli.corpus, &cli.cache)?;
            let outcome = ranker.rank(&query, limit, &Map::new());
            println!("{}", serde_json::to_string_pretty(&outcome.hits)?);
            Ok(())
        }
        Commands::Warm { queries } => {
            let ranker = open_ranker(&cli.corpus, &cli.cache)?;
            let queries = read_queries(&queries)?;
            let mut computed = 0usize;
            for q in &queries {
                let outcome = ranker.rank(q, 0, &Map::new());
                if let Some(e) = outcome.warnings.into_iter().next() {
                    return Err(anyhow!("warming {q:?} failed: {e}"));
                }
                if !outcome.cache_hit { computed += 1; }
            }
            tracing::info!(total = queries.len(), computed, "cache warmed");
            Ok(())
        }
        Commands::ClearCache => {
            JsonFileCache::new(&cli.cache).clear()?;
            tracing::info!(cache = %cli.cache.display(), "cache cleared");
            Ok(())
        }
    }
}

fn open_ranker(corpus_path: &Path, cache_path: &Path) -> Result<Ranker> {
    let corpus = Arc::new(CorpusStore::new());
    corpus.load(corpus_path)?;
    Ok(Ranker::new(corpus, Arc::new(JsonFileCache::new(cache_path))))
}

/// Non-empty lines that are not `#` comments. Lines are kept verbatim.
fn read_queries(path: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') { continue; }
        out.push(line);
    }
    Ok(out)
}
