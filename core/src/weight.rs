//! TF-IDF and BM25 weighting over gram statistics.
//!
//! Statistics come from a [`StatsSource`]: the in-memory [`Corpus`]
//! (pre-indexed) or the persistent store (post-indexed). Both feed the same
//! formulas with the same integer counts, so the two modes yield identical
//! vectors.

use crate::config::{Algorithm, Config, BM25_B, BM25_K1};
use crate::engine::Deadline;
use crate::error::{Error, Result};
use crate::gram::{Gram, GramKey};
use crate::index::Corpus;
use crate::persist::{GramStore, GramTable};
use crate::DocId;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::{BTreeMap, HashMap};

/// Sparse gram weights. A missing key weighs zero. Ordered so that sums
/// over a vector are reproducible.
pub type WeightVector = BTreeMap<GramKey, f64>;

/// Occurrences per key within one document (or query), plus its length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermCounts {
    pub counts: BTreeMap<GramKey, u32>,
    pub len: u64,
}

impl TermCounts {
    /// Groups grams of a single document by key. Grams from more than one
    /// document are rejected.
    pub fn from_grams<'a>(grams: impl IntoIterator<Item = &'a Gram>, include_jumps: bool) -> Result<Self> {
        let mut out = TermCounts::default();
        let mut expected: Option<DocId> = None;
        for gram in grams {
            match expected {
                None => expected = Some(gram.doc_id),
                Some(doc) if doc != gram.doc_id => {
                    return Err(Error::MismatchedDocument { expected: doc, found: gram.doc_id });
                }
                Some(_) => {}
            }
            *out.counts.entry(gram.key(include_jumps, false)).or_insert(0) += gram.count;
            out.len += u64::from(gram.count);
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Where TF and DF come from.
pub trait StatsSource: Sync {
    fn total_docs(&self) -> Result<u64>;

    /// Gram occurrences across the corpus.
    fn total_grams(&self) -> Result<u64>;

    fn document_counts(&self, doc: DocId, include_jumps: bool) -> Result<TermCounts>;

    fn document_frequency(&self, key: &GramKey, include_jumps: bool) -> Result<u32>;
}

impl StatsSource for Corpus {
    fn total_docs(&self) -> Result<u64> {
        Ok(Corpus::total_docs(self))
    }

    fn total_grams(&self) -> Result<u64> {
        Ok(Corpus::total_grams(self))
    }

    fn document_counts(&self, doc: DocId, include_jumps: bool) -> Result<TermCounts> {
        TermCounts::from_grams(self.document_grams(doc), include_jumps)
    }

    fn document_frequency(&self, key: &GramKey, include_jumps: bool) -> Result<u32> {
        Ok(Corpus::document_frequency(self, key, include_jumps))
    }
}

/// Post-indexed statistics, queried from the store on every call.
pub struct StoreStats<'a, S: ?Sized> {
    store: &'a S,
    table: GramTable,
}

impl<'a, S: GramStore + ?Sized> StoreStats<'a, S> {
    pub fn new(store: &'a S, table: GramTable) -> Self {
        Self { store, table }
    }
}

impl<S: GramStore + ?Sized> StatsSource for StoreStats<'_, S> {
    fn total_docs(&self) -> Result<u64> {
        self.store.document_count()
    }

    fn total_grams(&self) -> Result<u64> {
        self.store.total_occurrences(self.table)
    }

    fn document_counts(&self, doc: DocId, include_jumps: bool) -> Result<TermCounts> {
        let mut out = TermCounts::default();
        for (key, count) in self.store.grouped_counts(self.table, doc, include_jumps)? {
            out.counts.insert(key, count);
            out.len += u64::from(count);
        }
        Ok(out)
    }

    fn document_frequency(&self, key: &GramKey, include_jumps: bool) -> Result<u32> {
        self.store.distinct_documents(self.table, key, include_jumps)
    }
}

/// `tf = count / len`, `idf = ln(N / (1 + df))`.
pub fn tf_idf(count: u32, len: u64, df: u32, total_docs: u64) -> f64 {
    let tf = f64::from(count) / len as f64;
    let idf = (total_docs as f64 / (1.0 + f64::from(df))).ln();
    tf * idf
}

/// Okapi BM25 with `k1 = 1.5`, `b = 0.75`; `count` is the raw frequency.
pub fn bm25(count: u32, len: u64, avg_len: f64, df: u32, total_docs: u64) -> f64 {
    let n = total_docs as f64;
    let df = f64::from(df);
    let tf = f64::from(count);
    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
    idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * (len as f64 / avg_len)))
}

/// Looks up DF for every key, fanned out over `pool` when one is given.
pub fn document_frequencies<S: StatsSource + ?Sized>(
    keys: &[GramKey],
    stats: &S,
    include_jumps: bool,
    pool: Option<&ThreadPool>,
    deadline: Deadline,
) -> Result<HashMap<GramKey, u32>> {
    match pool {
        Some(pool) => {
            let merged = Mutex::new(HashMap::with_capacity(keys.len()));
            pool.install(|| {
                keys.par_iter().try_for_each(|key| {
                    deadline.check()?;
                    let df = stats.document_frequency(key, include_jumps)?;
                    merged.lock().insert(*key, df);
                    Ok::<(), Error>(())
                })
            })?;
            Ok(merged.into_inner())
        }
        None => {
            let mut out = HashMap::with_capacity(keys.len());
            for key in keys {
                deadline.check()?;
                out.insert(*key, stats.document_frequency(key, include_jumps)?);
            }
            Ok(out)
        }
    }
}

/// Weighs the grams of one document or query under `config`.
///
/// TF always comes from `counts`; DF and corpus totals come from `stats`.
/// BM25 skips keys no document contains.
pub fn weigh<S: StatsSource + ?Sized>(
    counts: &TermCounts,
    stats: &S,
    config: &Config,
    pool: Option<&ThreadPool>,
    deadline: Deadline,
) -> Result<WeightVector> {
    if counts.is_empty() {
        return Err(Error::NoScorableTerms);
    }
    let total_docs = stats.total_docs()?;
    if total_docs == 0 {
        return Err(Error::EmptyCorpus);
    }

    let keys: Vec<GramKey> = counts.counts.keys().copied().collect();
    let dfs = document_frequencies(&keys, stats, config.include_jumps(), pool, deadline)?;

    let mut out = WeightVector::new();
    match config.algorithm {
        Algorithm::TfIdf => {
            for (key, &count) in &counts.counts {
                let df = dfs.get(key).copied().unwrap_or(0);
                out.insert(*key, tf_idf(count, counts.len, df, total_docs));
            }
        }
        Algorithm::Bm25 => {
            let avg_len = stats.total_grams()? as f64 / total_docs as f64;
            for (key, &count) in &counts.counts {
                let df = dfs.get(key).copied().unwrap_or(0);
                if df == 0 {
                    continue;
                }
                out.insert(*key, bm25(count, counts.len, avg_len, df, total_docs));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GramSize;
    use crate::gram::Window;
    use crate::source::SourceDoc;

    fn two_doc_corpus() -> Corpus {
        let src = vec![SourceDoc::new("doc1.txt", "a b a b"), SourceDoc::new("doc2.txt", "a c")];
        let mut corpus = Corpus::new();
        corpus.register(&src).unwrap();
        corpus.index(&src, GramSize::Unigram, 0).unwrap();
        corpus
    }

    fn unigram(corpus: &Corpus, token: &str) -> GramKey {
        GramKey { shape: Window::Unigram(corpus.terms().get(token).unwrap()), doc_id: None }
    }

    #[test]
    fn tf_idf_goes_negative_for_common_terms_and_zero_at_half() {
        let corpus = two_doc_corpus();
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();

        let doc1 = weigh(&corpus.document_counts(1, true).unwrap(), &corpus, &cfg, None, Deadline::none()).unwrap();
        let a = doc1[&unigram(&corpus, "a")];
        assert!((a - 0.5 * (2.0f64 / 3.0).ln()).abs() < 1e-12);
        assert!(a < 0.0);

        let doc2 = weigh(&corpus.document_counts(2, true).unwrap(), &corpus, &cfg, None, Deadline::none()).unwrap();
        let c = doc2[&unigram(&corpus, "c")];
        assert!((c - 0.5 * 1.0f64.ln()).abs() < 1e-12);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn bm25_matches_hand_computation() {
        let corpus = two_doc_corpus();
        let cfg = Config::new(1, 0, Algorithm::Bm25).unwrap();
        let doc2 = weigh(&corpus.document_counts(2, true).unwrap(), &corpus, &cfg, None, Deadline::none()).unwrap();

        // N = 2, df(c) = 1, tf = 1, len = 2, avg_len = 6 / 2
        let idf = ((2.0 - 1.0 + 0.5) / (1.0 + 0.5) + 1.0f64).ln();
        let expected = idf * (1.0 * 2.5) / (1.0 + 1.5 * (1.0 - 0.75 + 0.75 * (2.0 / 3.0)));
        assert!((doc2[&unigram(&corpus, "c")] - expected).abs() < 1e-12);
    }

    #[test]
    fn parallel_frequencies_match_sequential() {
        let corpus = two_doc_corpus();
        let keys: Vec<GramKey> = ["a", "b", "c"].iter().map(|t| unigram(&corpus, t)).collect();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let seq = document_frequencies(&keys, &corpus, true, None, Deadline::none()).unwrap();
        let par = document_frequencies(&keys, &corpus, true, Some(&pool), Deadline::none()).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq[&keys[0]], 2);
    }

    #[test]
    fn mixed_documents_are_rejected() {
        let grams = vec![Gram::new(Window::Unigram(1), 1), Gram::new(Window::Unigram(2), 2)];
        let err = TermCounts::from_grams(&grams, true).unwrap_err();
        assert!(matches!(err, Error::MismatchedDocument { expected: 1, found: 2 }));
    }

    #[test]
    fn empty_counts_and_empty_corpus_are_errors() {
        let corpus = two_doc_corpus();
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();
        let empty = TermCounts::default();
        assert!(matches!(weigh(&empty, &corpus, &cfg, None, Deadline::none()), Err(Error::NoScorableTerms)));

        let counts = TermCounts::from_grams(&[Gram::new(Window::Unigram(1), 1)], true).unwrap();
        let nothing = Corpus::new();
        assert!(matches!(weigh(&counts, &nothing, &cfg, None, Deadline::none()), Err(Error::EmptyCorpus)));
    }
}
