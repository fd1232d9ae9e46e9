use anyhow::Result;
use axum::Router;
use clap::Parser;
use gramrank_core::{Algorithm, Config};
use gramrank_server::{build_app, load_engine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory written by `gramrank build`
    #[arg(long, default_value = "./gramrank.db")]
    store: PathBuf,
    #[arg(long, default_value_t = 1)]
    size: usize,
    #[arg(long, default_value_t = 0)]
    jump: usize,
    #[arg(long, default_value = "tfidf")]
    algorithm: Algorithm,
    #[arg(long, default_value_t = false)]
    normalize_jumps: bool,
    #[arg(long, default_value_t = false)]
    post_indexed: bool,
    /// Rank on one thread instead of the worker pool
    #[arg(long, default_value_t = false)]
    sequential: bool,
    /// Per-request ranking deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = Config::new(args.size, args.jump, args.algorithm)?
        .with_normalize_jumps(args.normalize_jumps)
        .with_pre_indexed(!args.post_indexed)
        .with_parallel(!args.sequential);
    let engine = load_engine(&args.store, config, args.timeout_ms.map(Duration::from_millis))?;
    let app: Router = build_app(engine);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
