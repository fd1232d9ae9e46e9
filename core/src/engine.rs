//! Scoring engine bound to one configuration.
//!
//! Owns the worker pool used for fan-out, the per-document vector cache and
//! the optional per-query deadline. The corpus and store are shared
//! read-only.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::Corpus;
use crate::persist::{GramStore, GramTable};
use crate::similarity::{cosine, rank, Scored};
use crate::weight::{weigh, StatsSource, StoreStats, TermCounts, WeightVector};
use crate::DocId;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point in time after which workers give up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Deadline(Some(Instant::now() + timeout))
    }

    pub fn check(&self) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// One slot per document. The slot lock makes check-and-insert atomic, so a
/// vector is computed at most once however many workers ask for it.
struct VectorCache {
    slots: HashMap<DocId, Mutex<Option<Arc<WeightVector>>>>,
}

impl VectorCache {
    fn new(docs: impl IntoIterator<Item = DocId>) -> Self {
        Self { slots: docs.into_iter().map(|d| (d, Mutex::new(None))).collect() }
    }

    fn get_or_try_insert(
        &self,
        doc: DocId,
        compute: impl FnOnce() -> Result<WeightVector>,
    ) -> Result<Arc<WeightVector>> {
        let slot = self.slots.get(&doc).ok_or(Error::UnknownDocument(doc))?;
        let mut guard = slot.lock();
        if let Some(vector) = guard.as_ref() {
            return Ok(Arc::clone(vector));
        }
        let vector = Arc::new(compute()?);
        *guard = Some(Arc::clone(&vector));
        Ok(vector)
    }
}

pub struct Engine<S> {
    corpus: Arc<Corpus>,
    store: Arc<S>,
    config: Config,
    table: GramTable,
    pool: Option<ThreadPool>,
    cache: VectorCache,
    timeout: Option<Duration>,
}

impl<S: GramStore> Engine<S> {
    /// Fails when `corpus` was indexed for another `(size, max_jump)`.
    pub fn new(corpus: Arc<Corpus>, store: Arc<S>, config: Config) -> Result<Self> {
        let table = GramTable::new(config.gram_size, config.max_jump);
        if corpus.table() != Some(table) {
            return Err(Error::NotIndexed(table));
        }
        let pool = if config.parallel {
            Some(rayon::ThreadPoolBuilder::new().num_threads(config.workers()).build()?)
        } else {
            None
        };
        let cache = VectorCache::new(corpus.document_ids());
        Ok(Self { corpus, store, config, table, pool, cache, timeout: None })
    }

    /// Bounds each ranking call; a unit of work starting past the deadline
    /// fails with [`Error::DeadlineExceeded`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Deadline for a call starting now.
    pub fn deadline(&self) -> Deadline {
        self.timeout.map_or_else(Deadline::none, Deadline::after)
    }

    fn with_stats<T>(&self, f: impl FnOnce(&dyn StatsSource) -> Result<T>) -> Result<T> {
        if self.config.pre_indexed {
            f(&*self.corpus)
        } else {
            f(&StoreStats::new(&*self.store, self.table))
        }
    }

    /// Weight vector of a corpus document, computed once per engine.
    pub fn document_vector(&self, doc: DocId) -> Result<Arc<WeightVector>> {
        self.document_vector_until(doc, self.deadline())
    }

    // DF lookups for documents run inline on the calling thread: a thread
    // holding a cache slot must never wait on pool workers that may in turn
    // be blocked on that slot.
    fn document_vector_until(&self, doc: DocId, deadline: Deadline) -> Result<Arc<WeightVector>> {
        self.cache.get_or_try_insert(doc, || {
            self.with_stats(|stats| {
                let counts = stats.document_counts(doc, self.config.include_jumps())?;
                match weigh(&counts, stats, &self.config, None, deadline) {
                    // A document too short for the gram size has no terms.
                    Err(Error::NoScorableTerms) => Ok(WeightVector::new()),
                    other => other,
                }
            })
        })
    }

    /// Weight vector of free text. Unknown tokens contribute nothing; text
    /// with no known window yields [`Error::NoScorableTerms`].
    pub fn query_vector(&self, text: &str) -> Result<WeightVector> {
        self.query_vector_until(text, self.deadline())
    }

    fn query_vector_until(&self, text: &str, deadline: Deadline) -> Result<WeightVector> {
        let grams = self.corpus.query_grams(text, self.config.gram_size, self.config.max_jump);
        let counts = TermCounts::from_grams(&grams, self.config.include_jumps())?;
        self.with_stats(|stats| weigh(&counts, stats, &self.config, self.pool.as_ref(), deadline))
    }

    /// Every document ordered by similarity to `text`. A query without known
    /// terms scores zero everywhere and comes back in document-id order.
    pub fn rank(&self, text: &str) -> Result<Vec<Scored>> {
        let deadline = self.deadline();
        let query = match self.query_vector_until(text, deadline) {
            Err(Error::NoScorableTerms) => {
                tracing::debug!(query = text, "query has no scorable terms");
                WeightVector::new()
            }
            other => other?,
        };
        self.rank_vector(&query, deadline)
    }

    /// Scores every document against `query`, fanning out per document.
    pub fn rank_vector(&self, query: &WeightVector, deadline: Deadline) -> Result<Vec<Scored>> {
        let docs = self.corpus.document_ids();
        let scores: Mutex<HashMap<DocId, f64>> = Mutex::new(HashMap::with_capacity(docs.len()));
        let score_one = |doc: &DocId| -> Result<()> {
            deadline.check()?;
            let vector = self.document_vector_until(*doc, deadline)?;
            let sim = cosine(query, &vector);
            scores.lock().insert(*doc, sim);
            Ok(())
        };
        match &self.pool {
            Some(pool) => pool.install(|| docs.par_iter().try_for_each(score_one))?,
            None => docs.iter().try_for_each(score_one)?,
        }
        Ok(rank(scores.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, GramSize};
    use crate::index::build_or_warm;
    use crate::persist::SledStore;
    use crate::source::SourceDoc;

    fn engine(config: Config) -> Engine<SledStore> {
        let store = SledStore::temporary().unwrap();
        let src = vec![
            SourceDoc::new("1.txt", "lei federal imposto renda"),
            SourceDoc::new("2.txt", "decreto municipal imposto"),
            SourceDoc::new("3.txt", "portaria federal saude"),
        ];
        let corpus = build_or_warm(&store, &src, config.gram_size, config.max_jump).unwrap();
        Engine::new(Arc::new(corpus), Arc::new(store), config).unwrap()
    }

    #[test]
    fn ranks_every_document_best_first() {
        let cfg = Config::new(1, 0, Algorithm::Bm25).unwrap();
        let ranked = engine(cfg).rank("imposto renda").unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].doc_id, 1);
        assert_eq!(ranked[2].doc_id, 3);
    }

    #[test]
    fn unknown_query_falls_back_to_id_order() {
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();
        let e = engine(cfg);
        assert!(matches!(e.query_vector("nada disso"), Err(Error::NoScorableTerms)));
        let ids: Vec<DocId> = e.rank("nada disso").unwrap().iter().map(|s| s.doc_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn document_vectors_are_cached() {
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();
        let e = engine(cfg);
        let first = e.document_vector(2).unwrap();
        let second = e.document_vector(2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(e.document_vector(99), Err(Error::UnknownDocument(99))));
    }

    #[test]
    fn parallel_ranking_matches_sequential() {
        let cfg = Config::new(2, 1, Algorithm::TfIdf).unwrap();
        let seq = engine(cfg).rank("federal imposto renda").unwrap();
        let par = engine(cfg.with_parallel(true)).rank("federal imposto renda").unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn expired_deadline_aborts_ranking() {
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();
        let e = engine(cfg);
        let past = Deadline::after(Duration::ZERO);
        let query = e.query_vector("imposto").unwrap();
        assert!(matches!(e.rank_vector(&query, past), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn engine_requires_matching_index() {
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap();
        let e = engine(cfg);
        let other = Config::new(2, 0, Algorithm::TfIdf).unwrap();
        let corpus = Arc::clone(&e.corpus);
        let store = Arc::clone(&e.store);
        assert!(matches!(Engine::new(corpus, store, other), Err(Error::NotIndexed(t)) if t.size == GramSize::Bigram));
    }
}
