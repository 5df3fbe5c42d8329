use crate::cache::CacheRepository;
use crate::score::{query_terms, score_all};
use crate::{CorpusStore, Error};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Corpus indices ordered by descending score, zero scores excluded.
pub type Ranking = Vec<usize>;

/// Fields written over every returned document.
pub type ExtraFields = Map<String, Value>;

/// One result: the document's fields merged with the caller's extra fields.
pub type Hit = Map<String, Value>;

#[derive(Debug, Default)]
pub struct RankOutcome {
    pub hits: Vec<Hit>,
    /// The ranking came from the cache and no scoring pass ran.
    pub cache_hit: bool,
    /// Problems that did not stop the request (cache load/write, stale indices).
    pub warnings: Vec<Error>,
}

/// Stable sort of corpus indices by descending score, dropping zeros.
pub fn build_ranking(scores: &[u64]) -> Ranking {
    let mut scored: Vec<(usize, u64)> = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

pub fn take_limit(ranking: &[usize], limit: i64) -> &[usize] {
    if limit <= 0 {
        return &[];
    }
    let k = usize::try_from(limit).unwrap_or(usize::MAX).min(ranking.len());
    &ranking[..k]
}

pub struct Ranker {
    corpus: Arc<CorpusStore>,
    cache: Arc<dyn CacheRepository>,
    // held across lookup, scoring and record
    write_lock: Mutex<()>,
}

impl Ranker {
    pub fn new(corpus: Arc<CorpusStore>, cache: Arc<dyn CacheRepository>) -> Self {
        Self { corpus, cache, write_lock: Mutex::new(()) }
    }

    /// Top `limit` documents for `query`, each merged with `extra`.
    ///
    /// Never fails: cache and lookup problems are logged and returned in
    /// `warnings` while the best available answer is still produced.
    pub fn rank(&self, query: &str, limit: i64, extra: &ExtraFields) -> RankOutcome {
        let key = query.to_lowercase();
        let mut outcome = RankOutcome::default();

        let ranking = {
            let _guard = self.write_lock.lock();
            let cached = match self.cache.lookup(&key) {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!(error = %e, "query cache load failed, recomputing");
                    outcome.warnings.push(e);
                    None
                }
            };
            match cached {
                Some(ranking) => {
                    tracing::debug!(query = %key, ?ranking, "query cache hit");
                    outcome.cache_hit = true;
                    ranking
                }
                None => {
                    let ranking = self.compute(&key);
                    match self.cache.record(&key, &ranking) {
                        Ok(()) => tracing::info!(query = %key, "query cache updated"),
                        Err(e) => {
                            tracing::error!(query = %key, error = %e, "query cache write failed");
                            outcome.warnings.push(e);
                        }
                    }
                    ranking
                }
            }
        };

        for &index in take_limit(&ranking, limit) {
            match self.corpus.document_at(index) {
                Ok(doc) => outcome.hits.push(doc.merged(extra)),
                Err(e) => {
                    tracing::warn!(query = %key, error = %e, "skipping stale ranking entry");
                    outcome.warnings.push(e);
                }
            }
        }
        tracing::debug!(query = %key, limit, hits = outcome.hits.len(), "ranked");
        outcome
    }

    fn compute(&self, key: &str) -> Ranking {
        let terms = query_terms(key);
        let scores = score_all(self.corpus.documents(), &terms);
        let ranking = build_ranking(&scores);
        tracing::debug!(query = %key, scored = scores.len(), ranked = ranking.len(), "scored corpus");
        ranking
    }
}
