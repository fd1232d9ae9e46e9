use gramrank_core::gram::{GramKey, Window};
use gramrank_core::{
    build_or_warm, evaluate_matrix, read_corpus_dir, Algorithm, Config, Engine, GramSize, GramStore, GramTable,
    Matrix, Oracle, ReferenceSet, SledStore, SourceDoc,
};
use std::fs;
use std::sync::Arc;

fn scenario() -> Vec<SourceDoc> {
    vec![SourceDoc::new("doc1.txt", "a b a b"), SourceDoc::new("doc2.txt", "a c")]
}

#[test]
fn concrete_scenario_weights() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let corpus = Arc::new(build_or_warm(&*store, &scenario(), GramSize::Unigram, 0).unwrap());
    let id = |t: &str| corpus.terms().get(t).unwrap();
    let key = |t: &str| GramKey { shape: Window::Unigram(id(t)), doc_id: None };

    for pre_indexed in [true, false] {
        let cfg = Config::new(1, 0, Algorithm::TfIdf).unwrap().with_pre_indexed(pre_indexed);
        let engine = Engine::new(Arc::clone(&corpus), Arc::clone(&store), cfg).unwrap();

        let a = engine.document_vector(1).unwrap()[&key("a")];
        assert!((a - 0.5 * (2.0f64 / 3.0).ln()).abs() < 1e-12);
        assert!(a < 0.0);

        let c = engine.document_vector(2).unwrap()[&key("c")];
        assert_eq!(c, 0.0);
    }
}

#[test]
fn second_build_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![
        SourceDoc::new("x.txt", "um dois tres um dois tres quatro"),
        SourceDoc::new("y.txt", "dois quatro cinco"),
    ];
    let table = GramTable::new(GramSize::Trigram, 2);

    let (rows, first) = {
        let store = SledStore::open(dir.path()).unwrap();
        let corpus = build_or_warm(&store, &sources, GramSize::Trigram, 2).unwrap();
        (store.gram_rows(table).unwrap(), corpus)
    };
    assert_eq!(rows as usize, first.grams().len());

    let store = SledStore::open(dir.path()).unwrap();
    let second = build_or_warm(&store, &sources, GramSize::Trigram, 2).unwrap();
    assert_eq!(store.gram_rows(table).unwrap(), rows);
    assert_eq!(store.document_count().unwrap(), 2);
    assert_eq!(second.total_grams(), first.total_grams());

    let mut a = first.grams().to_vec();
    let mut b = second.grams().to_vec();
    a.sort_by_key(|g| (g.doc_id, g.shape));
    b.sort_by_key(|g| (g.doc_id, g.shape));
    assert_eq!(a, b);
}

#[test]
fn gram_tables_are_kept_per_configuration() {
    let store = SledStore::temporary().unwrap();
    let uni = build_or_warm(&store, &scenario(), GramSize::Unigram, 0).unwrap();
    let bi = build_or_warm(&store, &scenario(), GramSize::Bigram, 1).unwrap();
    assert_eq!(store.gram_rows(GramTable::new(GramSize::Unigram, 0)).unwrap(), uni.grams().len() as u64);
    assert_eq!(store.gram_rows(GramTable::new(GramSize::Bigram, 1)).unwrap(), bi.grams().len() as u64);
    assert_eq!(store.document_count().unwrap(), 2);
}

#[test]
fn evaluates_a_matrix_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1.txt"), "lei federal imposto renda").unwrap();
    fs::write(dir.path().join("2.txt"), "decreto municipal imposto").unwrap();
    fs::write(dir.path().join("3.txt"), "portaria federal saude").unwrap();
    let refs_path = dir.path().join("refs.json");
    fs::write(
        &refs_path,
        r#"{ "words2": [ { "input": "imposto renda", "glove": [1, 2, 3] },
                         { "input": "federal saude", "glove": [3, 1, 2] } ] }"#,
    )
    .unwrap();

    let sources = read_corpus_dir(dir.path()).unwrap();
    let refs = ReferenceSet::from_path(&refs_path).unwrap();
    let store = Arc::new(SledStore::temporary().unwrap());
    let matrix = Matrix::new(vec![
        Config::new(1, 0, Algorithm::TfIdf).unwrap(),
        Config::new(1, 0, Algorithm::Bm25).unwrap().with_pre_indexed(false),
        Config::new(2, 1, Algorithm::Bm25).unwrap().with_parallel(true),
    ]);

    let results = evaluate_matrix(store, &sources, &refs, Oracle::Glove, &matrix, None).unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.document_count, 3);
        assert_eq!(result.overall.accuracy.count, 2);
        assert!(result.overall.accuracy.min >= -1.0 && result.overall.accuracy.max <= 1.0);
        assert!(result.classes.contains_key("words2"));
    }
    let json = serde_json::to_string(&results).unwrap();
    assert!(json.contains("\"latency_us\""));
}

#[test]
fn same_file_name_in_two_folders_indexes_both() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::create_dir_all(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("a/doc.txt"), "x y").unwrap();
    fs::write(dir.path().join("b/doc.txt"), "z w").unwrap();

    let sources = read_corpus_dir(dir.path()).unwrap();
    let store = SledStore::temporary().unwrap();
    let corpus = build_or_warm(&store, &sources, GramSize::Unigram, 0).unwrap();
    assert_eq!(corpus.document_ids(), vec![1, 2]);
    assert_eq!(corpus.document_grams(1).count(), 2);
    assert_eq!(corpus.document_grams(2).count(), 2);
}

#[test]
fn duplicate_document_names_fail_the_build() {
    let store = SledStore::temporary().unwrap();
    let sources = vec![SourceDoc::new("doc.txt", "x y"), SourceDoc::new("doc.txt", "z w")];
    let err = build_or_warm(&store, &sources, GramSize::Unigram, 0).unwrap_err();
    assert!(matches!(err, gramrank_core::Error::DuplicateDocument(_)));
    assert_eq!(store.document_count().unwrap(), 0);
}
