use crate::config::GramSize;
use crate::error::{Error, Result};
use crate::extract::extract_sized;
use crate::gram::{Gram, GramKey, Window};
use crate::persist::{GramStore, GramTable, StoreMeta, STORE_VERSION};
use crate::source::SourceDoc;
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type WordId = u32;
pub type DocId = u32;

/// Document id carried by query grams. Real documents start at 1.
pub const QUERY_DOC: DocId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: WordId,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocKind {
    Text,
    Pdf,
}

impl DocKind {
    /// Provenance from the file name: `x.pdf.txt` is extracted PDF text.
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".pdf.txt") {
            DocKind::Pdf
        } else {
            DocKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub name: String,
    pub size: u64,
    pub kind: DocKind,
}

/// Dense token -> word id table, filled once before gram indexing.
#[derive(Debug, Default, Clone)]
pub struct TermTable {
    ids: HashMap<String, WordId>,
    words: Vec<Word>,
}

impl TermTable {
    pub fn from_words(words: Vec<Word>) -> Self {
        let ids = words.iter().map(|w| (w.value.clone(), w.id)).collect();
        Self { ids, words }
    }

    pub fn get(&self, token: &str) -> Option<WordId> {
        self.ids.get(token).copied()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Explicit context owning the registry, the term table and both index views.
///
/// Grams live in one arena; the forward index (`doc -> slots`) and the
/// inverted index (`key without doc -> doc -> slot`) both point into it, so
/// the two views always describe the same collection. A third view maps the
/// jump-normalized key to the set of documents containing it.
#[derive(Debug, Default)]
pub struct Corpus {
    documents: BTreeMap<DocId, Document>,
    terms: TermTable,
    table: Option<GramTable>,
    grams: Vec<Gram>,
    forward: HashMap<DocId, Vec<usize>>,
    inverted: HashMap<GramKey, BTreeMap<DocId, usize>>,
    normalized: HashMap<GramKey, BTreeSet<DocId>>,
    total_grams: u64,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers documents (ids 1.. in input order) and the sorted term table.
    /// Clears any gram index built before. Names must be unique.
    pub fn register(&mut self, sources: &[SourceDoc]) -> Result<()> {
        let mut names = HashSet::with_capacity(sources.len());
        for src in sources {
            if !names.insert(src.name.as_str()) {
                return Err(Error::DuplicateDocument(src.name.clone()));
            }
        }
        self.documents = sources
            .iter()
            .zip(1..)
            .map(|(src, id)| {
                (id, Document { id, name: src.name.clone(), size: src.size, kind: src.kind })
            })
            .collect();

        let distinct: BTreeSet<&str> = sources.iter().flat_map(|s| tokenize(&s.text)).collect();
        let words = distinct
            .into_iter()
            .zip(1..)
            .map(|(value, id)| Word { id, value: value.to_string() })
            .collect();
        self.terms = TermTable::from_words(words);
        self.reset_grams();
        tracing::info!(num_docs = self.documents.len(), num_terms = self.terms.len(), "registered corpus");
        Ok(())
    }

    /// Adopts a registry previously persisted by [`Corpus::register`].
    pub fn restore_registry(&mut self, documents: Vec<Document>, words: Vec<Word>) {
        self.documents = documents.into_iter().map(|d| (d.id, d)).collect();
        self.terms = TermTable::from_words(words);
        self.reset_grams();
    }

    /// Builds both index views for `(size, max_jump)` from the source texts.
    ///
    /// The term table must already hold every token; a missing one aborts
    /// indexing with [`Error::UnknownToken`].
    pub fn index(&mut self, sources: &[SourceDoc], size: GramSize, max_jump: usize) -> Result<()> {
        self.reset_grams();
        let by_name: HashMap<String, DocId> =
            self.documents.values().map(|d| (d.name.clone(), d.id)).collect();

        for src in sources {
            let doc_id = *by_name
                .get(&src.name)
                .ok_or_else(|| Error::UnregisteredDocument(src.name.clone()))?;
            let tokens = src.tokens();
            for window in extract_sized(&tokens, size, max_jump) {
                let shape = window
                    .try_map(|t| self.terms.get(t).ok_or_else(|| Error::UnknownToken(t.to_string())))?;
                self.record(shape, doc_id, 1);
            }
        }
        self.table = Some(GramTable::new(size, max_jump));
        tracing::info!(
            size = size.get(),
            max_jump,
            grams = self.grams.len(),
            occurrences = self.total_grams,
            "indexed corpus"
        );
        Ok(())
    }

    /// Rebuilds both index views from persisted gram rows.
    pub fn restore_grams(&mut self, table: GramTable, grams: Vec<Gram>) {
        self.reset_grams();
        for gram in grams {
            self.record(gram.shape, gram.doc_id, gram.count);
        }
        self.table = Some(table);
        tracing::info!(table = %table, grams = self.grams.len(), occurrences = self.total_grams, "warmed index from store");
    }

    /// First sighting of `(shape, doc)` adds a gram to the arena and to both
    /// views; later ones only bump its count.
    fn record(&mut self, shape: Window<WordId>, doc_id: DocId, count: u32) {
        let key = GramKey { shape, doc_id: None };
        let postings = self.inverted.entry(key).or_default();
        match postings.get(&doc_id) {
            Some(&slot) => self.grams[slot].count += count,
            None => {
                let slot = self.grams.len();
                self.grams.push(Gram { shape, doc_id, count });
                postings.insert(doc_id, slot);
                self.forward.entry(doc_id).or_default().push(slot);
                self.normalized.entry(key.without_jumps()).or_default().insert(doc_id);
            }
        }
        self.total_grams += u64::from(count);
    }

    fn reset_grams(&mut self) {
        self.table = None;
        self.grams.clear();
        self.forward.clear();
        self.inverted.clear();
        self.normalized.clear();
        self.total_grams = 0;
    }

    /// Turns free text into transient grams owned by [`QUERY_DOC`]. Windows
    /// touching a token outside the term table are dropped.
    pub fn query_grams(&self, text: &str, size: GramSize, max_jump: usize) -> Vec<Gram> {
        let tokens = tokenize(text);
        extract_sized(&tokens, size, max_jump)
            .into_iter()
            .filter_map(|w| w.try_map(|t| self.terms.get(t).ok_or(())).ok())
            .map(|shape| Gram::new(shape, QUERY_DOC))
            .collect()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn document_ids(&self) -> Vec<DocId> {
        self.documents.keys().copied().collect()
    }

    pub fn total_docs(&self) -> u64 {
        self.documents.len() as u64
    }

    pub fn terms(&self) -> &TermTable {
        &self.terms
    }

    pub fn table(&self) -> Option<GramTable> {
        self.table
    }

    /// Every gram in the arena, in insertion order.
    pub fn grams(&self) -> &[Gram] {
        &self.grams
    }

    /// Forward index: the grams of one document.
    pub fn document_grams(&self, doc: DocId) -> impl Iterator<Item = &Gram> {
        self.forward
            .get(&doc)
            .into_iter()
            .flatten()
            .map(move |&slot| &self.grams[slot])
    }

    /// Inverted index: the documents containing `key`, with their gram.
    pub fn postings(&self, key: &GramKey) -> impl Iterator<Item = (DocId, &Gram)> {
        self.inverted
            .get(&key.without_doc())
            .into_iter()
            .flatten()
            .map(move |(&doc, &slot)| (doc, &self.grams[slot]))
    }

    /// Number of documents containing `key`. Without jumps, grams that differ
    /// only in skip distance count as one.
    pub fn document_frequency(&self, key: &GramKey, include_jumps: bool) -> u32 {
        let key = key.without_doc();
        let n = if include_jumps {
            self.inverted.get(&key).map_or(0, BTreeMap::len)
        } else {
            self.normalized.get(&key.without_jumps()).map_or(0, BTreeSet::len)
        };
        n as u32
    }

    /// Gram occurrences across the whole corpus.
    pub fn total_grams(&self) -> u64 {
        self.total_grams
    }
}

/// Loads the corpus for `(size, max_jump)`, creating persistent state on
/// first use.
///
/// Documents and words are registered in the store once. Gram rows are
/// inserted in a single batch only when the table for this configuration is
/// empty; otherwise nothing is written and the index is warmed from the
/// existing rows.
pub fn build_or_warm<S: GramStore + ?Sized>(
    store: &S,
    sources: &[SourceDoc],
    size: GramSize,
    max_jump: usize,
) -> Result<Corpus> {
    let mut corpus = Corpus::new();
    if store.document_count()? == 0 {
        corpus.register(sources)?;
        let docs: Vec<Document> = corpus.documents().cloned().collect();
        store.insert_documents(&docs)?;
        store.insert_words(corpus.terms().words())?;
        store.write_meta(&StoreMeta::current())?;
    } else {
        check_version(store)?;
        corpus.restore_registry(store.documents()?, store.words()?);
    }

    let table = GramTable::new(size, max_jump);
    if store.gram_rows(table)? == 0 {
        corpus.index(sources, size, max_jump)?;
        let inserted = store.insert_grams(table, corpus.grams())?;
        store.flush()?;
        tracing::info!(table = %table, inserted, "persisted gram rows");
    } else {
        corpus.restore_grams(table, store.grams(table)?);
    }
    Ok(corpus)
}

/// Warms the corpus for `(size, max_jump)` from a store that already holds
/// its gram rows.
pub fn load<S: GramStore + ?Sized>(store: &S, size: GramSize, max_jump: usize) -> Result<Corpus> {
    let table = GramTable::new(size, max_jump);
    if store.gram_rows(table)? == 0 {
        return Err(Error::NotIndexed(table));
    }
    check_version(store)?;
    let mut corpus = Corpus::new();
    corpus.restore_registry(store.documents()?, store.words()?);
    corpus.restore_grams(table, store.grams(table)?);
    Ok(corpus)
}

fn check_version<S: GramStore + ?Sized>(store: &S) -> Result<()> {
    match store.meta()? {
        Some(meta) if meta.version != STORE_VERSION => {
            Err(Error::IncompatibleStore { found: meta.version, expected: STORE_VERSION })
        }
        _ => Ok(()),
    }
}
