pub mod cache;
pub mod corpus;
pub mod error;
pub mod rank;
pub mod score;

pub use cache::{CacheRepository, JsonFileCache, MemoryCache, QueryCache, SledCache};
pub use corpus::{CorpusStore, Document};
pub use error::{Error, Result};
pub use rank::{ExtraFields, Hit, RankOutcome, Ranker, Ranking};
