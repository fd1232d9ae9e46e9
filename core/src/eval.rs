//! Evaluation harness: ranks reference queries, compares the result with an
//! external oracle ranking through Spearman's rho and aggregates accuracy and
//! latency per query length class.

use crate::config::{Algorithm, Config, GramSize};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::index::{build_or_warm, Corpus};
use crate::persist::{GramStore, GramTable};
use crate::source::SourceDoc;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Spearman's rank correlation between two orderings of the same ids.
///
/// Both sides must be permutations of one id set: empty input, differing
/// lengths, duplicates or an id missing on either side are all
/// [`Error::RankingMismatch`].
pub fn spearman<T: Eq + Hash + Copy + fmt::Debug>(produced: &[T], reference: &[T]) -> Result<f64> {
    if produced.is_empty() || reference.is_empty() {
        return Err(Error::RankingMismatch("empty ranking".into()));
    }
    if produced.len() != reference.len() {
        return Err(Error::RankingMismatch(format!(
            "length {} vs reference length {}",
            produced.len(),
            reference.len()
        )));
    }

    let mut position = HashMap::with_capacity(produced.len());
    for (i, id) in produced.iter().enumerate() {
        if position.insert(*id, i).is_some() {
            return Err(Error::RankingMismatch(format!("duplicate id {id:?} in produced ranking")));
        }
    }

    let mut seen = HashSet::with_capacity(reference.len());
    let mut sum_d2 = 0.0;
    for (i, id) in reference.iter().enumerate() {
        if !seen.insert(*id) {
            return Err(Error::RankingMismatch(format!("duplicate id {id:?} in reference ranking")));
        }
        let j = position
            .get(id)
            .ok_or_else(|| Error::RankingMismatch(format!("id {id:?} missing from produced ranking")))?;
        let d = i as f64 - *j as f64;
        sum_d2 += d * d;
    }

    let n = produced.len() as f64;
    if produced.len() == 1 {
        return Ok(1.0);
    }
    Ok(1.0 - 6.0 * sum_d2 / (n * (n * n - 1.0)))
}

/// Which reference ranking of a query to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Oracle {
    #[default]
    Ranking,
    Bert,
    Word2vec,
    Glove,
}

impl FromStr for Oracle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ranking" => Ok(Oracle::Ranking),
            "bert" => Ok(Oracle::Bert),
            "word2vec" => Ok(Oracle::Word2vec),
            "glove" => Ok(Oracle::Glove),
            other => Err(format!("unknown oracle: {other}")),
        }
    }
}

impl fmt::Display for Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Oracle::Ranking => "ranking",
            Oracle::Bert => "bert",
            Oracle::Word2vec => "word2vec",
            Oracle::Glove => "glove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceQuery {
    pub input: String,
    #[serde(default)]
    pub ranking: Vec<DocId>,
    #[serde(default)]
    pub bert: Vec<DocId>,
    #[serde(default)]
    pub word2vec: Vec<DocId>,
    #[serde(default)]
    pub glove: Vec<DocId>,
}

impl ReferenceQuery {
    pub fn reference(&self, oracle: Oracle) -> &[DocId] {
        match oracle {
            Oracle::Ranking => &self.ranking,
            Oracle::Bert => &self.bert,
            Oracle::Word2vec => &self.word2vec,
            Oracle::Glove => &self.glove,
        }
    }
}

/// Reference queries grouped by length class (`words10`, `words20`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceSet(pub BTreeMap<String, Vec<ReferenceQuery>>);

impl ReferenceSet {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &[ReferenceQuery])> {
        self.0.iter().map(|(class, queries)| (class.as_str(), queries.as_slice()))
    }

    /// Total number of queries across classes.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running min / mean / max.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.avg += (value - self.avg) / self.count as f64;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassStats {
    /// Spearman's rho per query.
    pub accuracy: Summary,
    /// Vectorize plus rank, in microseconds.
    pub latency_us: Summary,
}

impl ClassStats {
    fn push(&mut self, rho: f64, latency: Duration) {
        self.accuracy.push(rho);
        self.latency_us.push(latency.as_secs_f64() * 1e6);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResult {
    pub label: String,
    pub config: Config,
    pub document_count: u64,
    pub total_time_ms: u64,
    pub classes: BTreeMap<String, ClassStats>,
    pub overall: ClassStats,
}

/// Runs reference queries through one engine.
pub struct Evaluator<'a, S> {
    engine: &'a Engine<S>,
    oracle: Oracle,
}

impl<'a, S: GramStore> Evaluator<'a, S> {
    pub fn new(engine: &'a Engine<S>, oracle: Oracle) -> Self {
        Self { engine, oracle }
    }

    /// Queries run one after another; each ranks the whole corpus.
    pub fn run(&self, references: &ReferenceSet) -> Result<ConfigResult> {
        let config = *self.engine.config();
        let started = Instant::now();
        let mut classes = BTreeMap::new();
        let mut overall = ClassStats::default();

        for (class, queries) in references.classes() {
            let stats: &mut ClassStats = classes.entry(class.to_string()).or_default();
            for query in queries {
                let t0 = Instant::now();
                let ranked = self.engine.rank(&query.input)?;
                let latency = t0.elapsed();

                let produced: Vec<DocId> = ranked.iter().map(|s| s.doc_id).collect();
                let rho = spearman(&produced, query.reference(self.oracle))?;
                tracing::debug!(class, rho, latency_us = latency.as_micros() as u64, "query evaluated");

                stats.push(rho, latency);
                overall.push(rho, latency);
            }
        }

        let total_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            config = %config,
            avg = overall.accuracy.avg,
            total_time_ms,
            "configuration evaluated"
        );
        Ok(ConfigResult {
            label: config.to_string(),
            config,
            document_count: self.engine.corpus().total_docs(),
            total_time_ms,
            classes,
            overall,
        })
    }
}

/// The set of configurations an evaluation sweeps over.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    configs: Vec<Config>,
}

impl Matrix {
    pub fn new(configs: Vec<Config>) -> Self {
        Self { configs }
    }

    /// Unigrams without jumps, bigrams up to jump 4 and trigrams up to jump
    /// 2, each crossed with both data-access modes, jump normalization on
    /// and off, and both weighting models.
    pub fn standard(parallel: bool) -> Result<Self> {
        let mut configs = Vec::new();
        for (size, max) in [(GramSize::Unigram, 0), (GramSize::Bigram, 4), (GramSize::Trigram, 2)] {
            for jump in 0..=max {
                for pre_indexed in [true, false] {
                    for normalize in [false, true] {
                        for algorithm in [Algorithm::TfIdf, Algorithm::Bm25] {
                            let cfg = Config::new(size.get(), jump, algorithm)?
                                .with_pre_indexed(pre_indexed)
                                .with_normalize_jumps(normalize)
                                .with_parallel(parallel);
                            configs.push(cfg);
                        }
                    }
                }
            }
        }
        Ok(Self { configs })
    }

    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Evaluates every configuration of `matrix`, building or warming the index
/// once per gram table.
pub fn evaluate_matrix<S: GramStore>(
    store: Arc<S>,
    sources: &[SourceDoc],
    references: &ReferenceSet,
    oracle: Oracle,
    matrix: &Matrix,
    timeout: Option<Duration>,
) -> Result<Vec<ConfigResult>> {
    let mut corpora: HashMap<GramTable, Arc<Corpus>> = HashMap::new();
    let mut results = Vec::with_capacity(matrix.len());

    for config in matrix.configs() {
        let table = GramTable::new(config.gram_size, config.max_jump);
        let corpus = match corpora.get(&table) {
            Some(corpus) => Arc::clone(corpus),
            None => {
                let corpus = Arc::new(build_or_warm(&*store, sources, config.gram_size, config.max_jump)?);
                corpora.insert(table, Arc::clone(&corpus));
                corpus
            }
        };
        let engine = Engine::new(corpus, Arc::clone(&store), *config)?.with_timeout(timeout);
        results.push(Evaluator::new(&engine, oracle).run(references)?);
    }
    Ok(results)
}
