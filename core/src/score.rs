use crate::Document;

/// Split an already lowercased query on single spaces. Empty terms are kept.
pub fn query_terms(query: &str) -> Vec<String> {
    query.split(' ').map(str::to_string).collect()
}

/// Number of summary words equal to each term, summed over all terms.
///
/// Matching is whole-word and case-insensitive. A term repeated in the query
/// counts once per repetition. Empty terms never match.
pub fn score<S: AsRef<str>>(summary: &str, terms: &[S]) -> u64 {
    let lowered = summary.to_lowercase();
    let words: Vec<&str> = lowered.split(' ').collect();
    let mut total = 0u64;
    for term in terms {
        let term = term.as_ref();
        if term.is_empty() { continue; }
        let hits = words.iter().filter(|w| **w == term).count();
        total = total.saturating_add(u64::try_from(hits).unwrap_or(u64::MAX));
    }
    total
}

pub fn score_all<S: AsRef<str>>(docs: &[Document], terms: &[S]) -> Vec<u64> {
    docs.iter().map(|d| score(&d.summary, terms)).collect()
}
