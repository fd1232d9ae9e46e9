//! Skip-gram inverted index with TF-IDF / BM25 ranking and a Spearman
//! evaluation harness.

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod extract;
pub mod gram;
pub mod index;
pub mod persist;
pub mod similarity;
pub mod source;
pub mod tokenizer;
pub mod weight;

pub use config::{Algorithm, Config, GramSize};
pub use engine::{Deadline, Engine};
pub use error::{Error, Result};
pub use eval::{evaluate_matrix, spearman, ConfigResult, Evaluator, Matrix, Oracle, ReferenceSet};
pub use gram::{Gram, GramKey, Jump, Window};
pub use index::{build_or_warm, load, Corpus, DocId, DocKind, Document, Word, WordId, QUERY_DOC};
pub use persist::{GramStore, GramTable, SledStore};
pub use similarity::Scored;
pub use source::{read_corpus_dir, SourceDoc};
pub use weight::WeightVector;
