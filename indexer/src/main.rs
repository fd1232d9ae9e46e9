use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gramrank_core::{
    build_or_warm, evaluate_matrix, load, read_corpus_dir, Algorithm, Config, ConfigResult, Engine, Matrix, Oracle,
    ReferenceSet, SledStore,
};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gramrank")]
#[command(about = "Build, query and evaluate a skip-gram inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Words per gram (1, 2 or 3)
    #[arg(long, default_value_t = 1)]
    size: usize,
    /// Largest skip distance between consecutive gram words
    #[arg(long, default_value_t = 0)]
    jump: usize,
    /// Weighting model: tfidf or bm25
    #[arg(long, default_value = "tfidf")]
    algorithm: Algorithm,
    /// Treat grams differing only in jump as one term
    #[arg(long, default_value_t = false)]
    normalize_jumps: bool,
    /// Query the store for TF/DF instead of the in-memory index
    #[arg(long, default_value_t = false)]
    post_indexed: bool,
    /// Fan out over a worker pool
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

impl ConfigArgs {
    fn config(&self) -> Result<Config> {
        Ok(Config::new(self.size, self.jump, self.algorithm)?
            .with_normalize_jumps(self.normalize_jumps)
            .with_pre_indexed(!self.post_indexed)
            .with_parallel(self.parallel))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory of cleaned text files into the store
    Build {
        /// Directory of .txt documents
        #[arg(long)]
        corpus: PathBuf,
        /// Store directory
        #[arg(long, default_value = "./gramrank.db")]
        store: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Rank stored documents against free text
    Query {
        #[arg(long, default_value = "./gramrank.db")]
        store: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
        /// Number of results to print
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Query text
        text: String,
    },
    /// Compare rankings with an oracle's reference rankings
    Evaluate {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, default_value = "./gramrank.db")]
        store: PathBuf,
        /// JSON file of reference queries grouped by length class
        #[arg(long)]
        references: PathBuf,
        /// Reference ranking to compare with: ranking, bert, word2vec or glove
        #[arg(long, default_value = "ranking")]
        oracle: Oracle,
        /// Per-query deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Sweep the standard configuration matrix instead of a single config
        #[arg(long, default_value_t = false)]
        all: bool,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Serialize)]
struct Report {
    created_at: String,
    oracle: Oracle,
    queries: usize,
    results: Vec<ConfigResult>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, store, config } => build(corpus, store, config.config()?),
        Commands::Query { store, config, top, text } => query(store, config.config()?, top, &text),
        Commands::Evaluate { corpus, store, references, oracle, timeout_ms, all, output, config } => {
            let matrix = if all { Matrix::standard(config.parallel)? } else { Matrix::new(vec![config.config()?]) };
            evaluate(corpus, store, references, oracle, timeout_ms.map(Duration::from_millis), matrix, output)
        }
    }
}

fn build(corpus: PathBuf, store: PathBuf, config: Config) -> Result<()> {
    let sources = read_corpus_dir(&corpus).with_context(|| format!("reading corpus {}", corpus.display()))?;
    let db = SledStore::open(&store).with_context(|| format!("opening store {}", store.display()))?;
    let index = build_or_warm(&db, &sources, config.gram_size, config.max_jump)?;
    tracing::info!(
        store = %store.display(),
        num_docs = index.total_docs(),
        grams = index.grams().len(),
        "index build complete"
    );
    Ok(())
}

fn query(store: PathBuf, config: Config, top: usize, text: &str) -> Result<()> {
    let db = Arc::new(SledStore::open(&store).with_context(|| format!("opening store {}", store.display()))?);
    let corpus = load(&*db, config.gram_size, config.max_jump).context("store holds no index for this configuration")?;
    let engine = Engine::new(Arc::new(corpus), db, config)?;

    for hit in engine.rank(text)?.into_iter().take(top) {
        let name = engine.corpus().document(hit.doc_id).map_or("?", |d| d.name.as_str());
        println!("{:>6}  {:+.6}  {}", hit.doc_id, hit.score, name);
    }
    Ok(())
}

fn evaluate(
    corpus: PathBuf,
    store: PathBuf,
    references: PathBuf,
    oracle: Oracle,
    timeout: Option<Duration>,
    matrix: Matrix,
    output: Option<PathBuf>,
) -> Result<()> {
    let sources = read_corpus_dir(&corpus).with_context(|| format!("reading corpus {}", corpus.display()))?;
    let refs = ReferenceSet::from_path(&references)
        .with_context(|| format!("reading references {}", references.display()))?;
    let db = Arc::new(SledStore::open(&store).with_context(|| format!("opening store {}", store.display()))?);
    tracing::info!(configs = matrix.len(), queries = refs.len(), %oracle, "starting evaluation");

    let results = evaluate_matrix(db, &sources, &refs, oracle, &matrix, timeout)?;
    let report = Report {
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        oracle,
        queries: refs.len(),
        results,
    };

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(output = %path.display(), "evaluation report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
