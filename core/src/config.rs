//! Scoring configuration: gram shape, jump handling, weighting model and
//! data-access strategy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest skip distance a configuration may request.
pub const MAX_JUMP: usize = 4;

/// Upper bound on worker threads, regardless of available cores.
pub const MAX_WORKERS: usize = 25;

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum GramSize {
    Unigram,
    Bigram,
    Trigram,
}

impl GramSize {
    pub fn get(self) -> usize {
        match self {
            GramSize::Unigram => 1,
            GramSize::Bigram => 2,
            GramSize::Trigram => 3,
        }
    }
}

impl TryFrom<usize> for GramSize {
    type Error = Error;

    fn try_from(size: usize) -> Result<Self> {
        match size {
            1 => Ok(GramSize::Unigram),
            2 => Ok(GramSize::Bigram),
            3 => Ok(GramSize::Trigram),
            other => Err(Error::InvalidGramSize(other)),
        }
    }
}

impl From<GramSize> for usize {
    fn from(size: GramSize) -> usize {
        size.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    TfIdf,
    Bm25,
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Algorithm::TfIdf),
            "bm25" => Ok(Algorithm::Bm25),
            other => Err(format!("unknown algorithm: {other}")),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::TfIdf => f.write_str("tfidf"),
            Algorithm::Bm25 => f.write_str("bm25"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Config {
    pub gram_size: GramSize,
    pub max_jump: usize,
    /// Collapse grams that differ only in skip distance into one statistic.
    pub normalize_jumps: bool,
    pub algorithm: Algorithm,
    /// Read TF/DF from the in-memory indices instead of querying the store.
    pub pre_indexed: bool,
    pub parallel: bool,
}

impl Config {
    pub fn new(gram_size: usize, max_jump: usize, algorithm: Algorithm) -> Result<Self> {
        let gram_size = GramSize::try_from(gram_size)?;
        if max_jump > MAX_JUMP {
            return Err(Error::InvalidJump(max_jump));
        }
        Ok(Self {
            gram_size,
            max_jump,
            normalize_jumps: false,
            algorithm,
            pre_indexed: true,
            parallel: false,
        })
    }

    pub fn with_normalize_jumps(mut self, normalize: bool) -> Self {
        self.normalize_jumps = normalize;
        self
    }

    pub fn with_pre_indexed(mut self, pre_indexed: bool) -> Self {
        self.pre_indexed = pre_indexed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Whether cache keys keep the jump component.
    pub fn include_jumps(&self) -> bool {
        !self.normalize_jumps
    }

    /// Worker count for fan-out: available cores, capped at [`MAX_WORKERS`].
    pub fn workers(&self) -> usize {
        if !self.parallel {
            return 1;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "algo={} | preIndexed={} | normalizeJumps={} | size={} | jumps={} | parallel={}",
            self.algorithm,
            self.pre_indexed,
            self.normalize_jumps,
            self.gram_size.get(),
            self.max_jump,
            self.parallel
        )
    }
}
