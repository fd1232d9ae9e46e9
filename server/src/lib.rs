use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use gramrank_core::{load, Config, DocId, DocKind, Document, Engine, Error, SledStore, WeightVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub config: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub name: String,
    pub kind: DocKind,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine<SledStore>>,
}

type ApiError = (StatusCode, String);

/// Opens the store at `path` and warms the index matching `config`.
pub fn load_engine(path: &std::path::Path, config: Config, timeout: Option<Duration>) -> Result<Arc<Engine<SledStore>>> {
    let store = Arc::new(SledStore::open(path).with_context(|| format!("opening store {}", path.display()))?);
    let corpus = load(&*store, config.gram_size, config.max_jump)
        .with_context(|| format!("no index for {config} in {}", path.display()))?;
    let engine = Engine::new(Arc::new(corpus), store, config)?.with_timeout(timeout);
    tracing::info!(config = %config, num_docs = engine.corpus().total_docs(), "engine ready");
    Ok(Arc::new(engine))
}

pub fn build_app(engine: Arc<Engine<SledStore>>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Error::UnknownDocument(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let engine = Arc::clone(&state.engine);
    let q = params.q.clone();

    // Ranking is CPU-bound and may fan out over the engine's own pool.
    let ranked = tokio::task::spawn_blocking(move || {
        let deadline = engine.deadline();
        let query = match engine.query_vector(&q) {
            // Nothing in the query is known to the corpus.
            Err(Error::NoScorableTerms) => return Ok(Vec::new()),
            other => other?,
        };
        engine.rank_vector(&query, deadline)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(|e| {
        tracing::warn!(error = %e, query = %params.q, "search failed");
        (status_for(&e), e.to_string())
    })?;

    let k = params.k.clamp(1, 100);
    let total_hits = ranked.len();
    let corpus = state.engine.corpus();
    let results = ranked
        .into_iter()
        .take(k)
        .filter_map(|hit| {
            corpus.document(hit.doc_id).map(|doc| SearchHit {
                doc_id: hit.doc_id,
                score: hit.score,
                name: doc.name.clone(),
                kind: doc.kind,
            })
        })
        .collect();

    Ok(Json(SearchResponse {
        query: params.q,
        config: state.engine.config().to_string(),
        took_s: start.elapsed().as_secs_f64(),
        total_hits,
        results,
    }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocView>, ApiError> {
    let engine = &state.engine;
    let doc = engine
        .corpus()
        .document(doc_id)
        .cloned()
        .ok_or_else(|| (StatusCode::NOT_FOUND, Error::UnknownDocument(doc_id).to_string()))?;

    let vector = engine.document_vector(doc_id).map_err(|e| (status_for(&e), e.to_string()))?;
    Ok(Json(DocView { terms: vector.len(), norm: norm(&vector), document: doc }))
}

#[derive(Serialize)]
pub struct DocView {
    #[serde(flatten)]
    pub document: Document,
    /// Distinct weighted grams.
    pub terms: usize,
    pub norm: f64,
}

fn norm(v: &WeightVector) -> f64 {
    v.values().map(|w| w * w).sum::<f64>().sqrt()
}
