use criterion::{criterion_group, criterion_main, Criterion};
use gramrank_core::extract::extract;
use gramrank_core::{build_or_warm, Algorithm, Config, Engine, SledStore, SourceDoc};
use std::sync::Arc;

fn synthetic_corpus(docs: usize, len: usize) -> Vec<SourceDoc> {
    (0..docs)
        .map(|d| {
            let text: Vec<String> = (0..len).map(|i| format!("t{}", (d * 7 + i * 13) % 97)).collect();
            SourceDoc::new(format!("{d:04}.txt"), text.join(" "))
        })
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let tokens: Vec<u32> = (0..500).collect();
    c.bench_function("extract_trigram_jump2", |b| b.iter(|| extract(&tokens, 3, 2)));
}

fn bench_rank(c: &mut Criterion) {
    let sources = synthetic_corpus(200, 120);
    let store = Arc::new(SledStore::temporary().expect("store"));
    let config = Config::new(2, 1, Algorithm::Bm25).expect("config");
    let corpus = Arc::new(build_or_warm(&*store, &sources, config.gram_size, config.max_jump).expect("index"));

    for parallel in [false, true] {
        let engine = Engine::new(Arc::clone(&corpus), Arc::clone(&store), config.with_parallel(parallel)).expect("engine");
        let name = if parallel { "rank_bigram_parallel" } else { "rank_bigram_sequential" };
        c.bench_function(name, |b| b.iter(|| engine.rank("t1 t14 t27 t40 t53")));
    }
}

criterion_group!(benches, bench_extract, bench_rank);
criterion_main!(benches);
