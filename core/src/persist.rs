use crate::config::GramSize;
use crate::error::{Error, Result};
use crate::gram::{Gram, GramKey, Jump, Window};
use crate::{DocId, Document, Word, WordId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

const META_KEY: &[u8] = b"meta";
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreMeta {
    pub version: u32,
    pub created_at: String,
}

impl StoreMeta {
    /// Record for a store created now by this version.
    pub fn current() -> Self {
        Self {
            version: STORE_VERSION,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        }
    }
}

/// Identifies the gram table of one `(size, max_jump)` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GramTable {
    pub size: GramSize,
    pub max_jump: usize,
}

impl GramTable {
    pub fn new(size: GramSize, max_jump: usize) -> Self {
        Self { size, max_jump }
    }

    fn by_key(&self) -> String {
        format!("grams/{}/{}/by_key", self.size.get(), self.max_jump)
    }

    fn by_doc(&self) -> String {
        format!("grams/{}/{}/by_doc", self.size.get(), self.max_jump)
    }

    fn total_key(&self) -> Vec<u8> {
        format!("total/{}/{}", self.size.get(), self.max_jump).into_bytes()
    }
}

impl fmt::Display for GramTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grams(size={}, jump={})", self.size.get(), self.max_jump)
    }
}

/// Relational view of the persistent store.
///
/// Three logical tables: documents, words, and one gram table per
/// [`GramTable`] with a uniqueness constraint over `(words, jumps, doc)`.
pub trait GramStore: Send + Sync {
    fn document_count(&self) -> Result<u64>;
    fn documents(&self) -> Result<Vec<Document>>;
    fn insert_documents(&self, docs: &[Document]) -> Result<()>;

    fn words(&self) -> Result<Vec<Word>>;
    fn insert_words(&self, words: &[Word]) -> Result<()>;

    fn meta(&self) -> Result<Option<StoreMeta>>;
    fn write_meta(&self, meta: &StoreMeta) -> Result<()>;

    /// Rows in a gram table.
    fn gram_rows(&self, table: GramTable) -> Result<u64>;

    /// Inserts all rows in one batch per tree; returns the number written.
    fn insert_grams(&self, table: GramTable, grams: &[Gram]) -> Result<usize>;

    /// Full table scan, ordered by document.
    fn grams(&self, table: GramTable) -> Result<Vec<Gram>>;

    /// Occurrence totals of one document grouped by key (jumps kept or
    /// dropped). Keys carry no document component.
    fn grouped_counts(&self, table: GramTable, doc: DocId, include_jumps: bool) -> Result<Vec<(GramKey, u32)>>;

    /// Number of distinct documents holding `key`.
    fn distinct_documents(&self, table: GramTable, key: &GramKey, include_jumps: bool) -> Result<u32>;

    /// Sum of `count` over the whole table.
    fn total_occurrences(&self, table: GramTable) -> Result<u64>;

    fn flush(&self) -> Result<()>;
}

/// [`GramStore`] on sled trees.
///
/// Gram rows are stored twice under big-endian composite keys so both
/// access paths are prefix scans: `words ++ jumps ++ doc` for document
/// frequency and `doc ++ words ++ jumps` for per-document counts. Values
/// hold the occurrence count.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Throwaway store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(name)?)
    }
}

impl GramStore for SledStore {
    fn document_count(&self) -> Result<u64> {
        Ok(self.tree("documents")?.len() as u64)
    }

    fn documents(&self) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for entry in self.tree("documents")?.iter() {
            let (_, v) = entry?;
            out.push(bincode::deserialize(&v)?);
        }
        Ok(out)
    }

    fn insert_documents(&self, docs: &[Document]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for doc in docs {
            batch.insert(doc.id.to_be_bytes().to_vec(), bincode::serialize(doc)?);
        }
        self.tree("documents")?.apply_batch(batch)?;
        Ok(())
    }

    fn words(&self) -> Result<Vec<Word>> {
        let mut out = Vec::new();
        for entry in self.tree("words")?.iter() {
            let (_, v) = entry?;
            out.push(bincode::deserialize(&v)?);
        }
        Ok(out)
    }

    fn insert_words(&self, words: &[Word]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for word in words {
            batch.insert(word.id.to_be_bytes().to_vec(), bincode::serialize(word)?);
        }
        self.tree("words")?.apply_batch(batch)?;
        Ok(())
    }

    fn meta(&self) -> Result<Option<StoreMeta>> {
        match self.tree("meta")?.get(META_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_meta(&self, meta: &StoreMeta) -> Result<()> {
        self.tree("meta")?.insert(META_KEY, serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }

    fn gram_rows(&self, table: GramTable) -> Result<u64> {
        Ok(self.tree(&table.by_key())?.len() as u64)
    }

    fn insert_grams(&self, table: GramTable, grams: &[Gram]) -> Result<usize> {
        let mut by_key = sled::Batch::default();
        let mut by_doc = sled::Batch::default();
        let mut occurrences = 0u64;
        for gram in grams {
            let count = gram.count.to_be_bytes().to_vec();
            by_key.insert(key_first(&gram.shape, gram.doc_id), count.clone());
            by_doc.insert(doc_first(&gram.shape, gram.doc_id), count);
            occurrences += u64::from(gram.count);
        }
        self.tree(&table.by_key())?.apply_batch(by_key)?;
        self.tree(&table.by_doc())?.apply_batch(by_doc)?;

        let meta = self.tree("meta")?;
        let total = read_total(meta.get(table.total_key())?)? + occurrences;
        meta.insert(table.total_key(), total.to_be_bytes().to_vec())?;
        Ok(grams.len())
    }

    fn grams(&self, table: GramTable) -> Result<Vec<Gram>> {
        let mut out = Vec::new();
        for entry in self.tree(&table.by_doc())?.iter() {
            let (k, v) = entry?;
            let (doc_id, shape) = decode_doc_first(table, &k)?;
            out.push(Gram { shape, doc_id, count: read_count(table, &v)? });
        }
        Ok(out)
    }

    fn grouped_counts(&self, table: GramTable, doc: DocId, include_jumps: bool) -> Result<Vec<(GramKey, u32)>> {
        let mut grouped: BTreeMap<GramKey, u32> = BTreeMap::new();
        for entry in self.tree(&table.by_doc())?.scan_prefix(doc.to_be_bytes()) {
            let (k, v) = entry?;
            let (_, shape) = decode_doc_first(table, &k)?;
            let shape = if include_jumps { shape } else { shape.without_jumps() };
            *grouped.entry(GramKey { shape, doc_id: None }).or_insert(0) += read_count(table, &v)?;
        }
        Ok(grouped.into_iter().collect())
    }

    fn distinct_documents(&self, table: GramTable, key: &GramKey, include_jumps: bool) -> Result<u32> {
        let mut prefix = encode_words(&key.shape);
        if include_jumps {
            prefix.extend(encode_jumps(&key.shape));
        }
        let mut docs = BTreeSet::new();
        for entry in self.tree(&table.by_key())?.scan_prefix(&prefix) {
            let (k, _) = entry?;
            if k.len() != row_len(table.size) {
                return Err(Error::CorruptRow(table.by_key()));
            }
            docs.insert(read_u32(&k[k.len() - 4..]));
        }
        Ok(docs.len() as u32)
    }

    fn total_occurrences(&self, table: GramTable) -> Result<u64> {
        read_total(self.tree("meta")?.get(table.total_key())?)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode_words(shape: &Window<WordId>) -> Vec<u8> {
    shape.terms().iter().flat_map(|w| w.to_be_bytes()).collect()
}

// One byte per jump column, -1 standing for "no jump".
fn encode_jumps(shape: &Window<WordId>) -> Vec<u8> {
    let arity = shape.size().get() - 1;
    shape.jumps()[..arity].iter().map(|j| j.unwrap_or(-1) as u8).collect()
}

fn key_first(shape: &Window<WordId>, doc: DocId) -> Vec<u8> {
    let mut key = encode_words(shape);
    key.extend(encode_jumps(shape));
    key.extend(doc.to_be_bytes());
    key
}

fn doc_first(shape: &Window<WordId>, doc: DocId) -> Vec<u8> {
    let mut key = doc.to_be_bytes().to_vec();
    key.extend(encode_words(shape));
    key.extend(encode_jumps(shape));
    key
}

/// Key length of a row: words, jump columns and the document id.
fn row_len(size: GramSize) -> usize {
    size.get() * 4 + (size.get() - 1) + 4
}

fn decode_doc_first(table: GramTable, key: &[u8]) -> Result<(DocId, Window<WordId>)> {
    if key.len() != row_len(table.size) {
        return Err(Error::CorruptRow(table.by_doc()));
    }
    Ok((read_u32(&key[..4]), decode_shape(table.size, &key[4..])))
}

fn read_count(table: GramTable, value: &[u8]) -> Result<u32> {
    if value.len() != 4 {
        return Err(Error::CorruptRow(table.by_doc()));
    }
    Ok(read_u32(value))
}

// Callers check the length against `row_len` first.
fn decode_shape(size: GramSize, bytes: &[u8]) -> Window<WordId> {
    let word = |i: usize| read_u32(&bytes[i * 4..i * 4 + 4]);
    let jump = |i: usize| -> Jump {
        match bytes[size.get() * 4 + i] as i8 {
            -1 => None,
            j => Some(j),
        }
    };
    match size {
        GramSize::Unigram => Window::Unigram(word(0)),
        GramSize::Bigram => Window::Bigram(word(0), word(1), jump(0)),
        GramSize::Trigram => Window::Trigram(word(0), word(1), word(2), jump(0), jump(1)),
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

fn read_total(bytes: Option<sled::IVec>) -> Result<u64> {
    match bytes {
        None => Ok(0),
        Some(b) if b.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&b);
            Ok(u64::from_be_bytes(buf))
        }
        Some(_) => Err(Error::CorruptRow("meta".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bigram(w0: WordId, w1: WordId, jump: i8, doc: DocId, count: u32) -> Gram {
        Gram { shape: Window::Bigram(w0, w1, Some(jump)), doc_id: doc, count }
    }

    #[test]
    fn rows_round_trip_through_both_trees() {
        let store = SledStore::temporary().unwrap();
        let table = GramTable::new(GramSize::Bigram, 1);
        let rows = vec![bigram(1, 2, 1, 1, 3), bigram(1, 2, 2, 1, 1), bigram(1, 2, 1, 2, 2)];
        assert_eq!(store.insert_grams(table, &rows).unwrap(), 3);

        assert_eq!(store.gram_rows(table).unwrap(), 3);
        assert_eq!(store.total_occurrences(table).unwrap(), 6);
        let mut back = store.grams(table).unwrap();
        back.sort_by_key(|g| (g.doc_id, g.shape));
        assert_eq!(back, rows);
    }

    #[test]
    fn grouped_and_distinct_counts_honour_jump_flag() {
        let store = SledStore::temporary().unwrap();
        let table = GramTable::new(GramSize::Bigram, 1);
        store
            .insert_grams(table, &[bigram(1, 2, 1, 1, 3), bigram(1, 2, 2, 1, 1), bigram(1, 2, 1, 2, 2)])
            .unwrap();

        let exact = store.grouped_counts(table, 1, true).unwrap();
        assert_eq!(exact.len(), 2);
        let merged = store.grouped_counts(table, 1, false).unwrap();
        assert_eq!(merged, vec![(GramKey { shape: Window::Bigram(1, 2, None), doc_id: None }, 4)]);

        let far = GramKey { shape: Window::Bigram(1, 2, Some(2)), doc_id: None };
        assert_eq!(store.distinct_documents(table, &far, true).unwrap(), 1);
        assert_eq!(store.distinct_documents(table, &far, false).unwrap(), 2);
    }

    #[test]
    fn tables_are_isolated_per_configuration() {
        let store = SledStore::temporary().unwrap();
        let narrow = GramTable::new(GramSize::Bigram, 0);
        let wide = GramTable::new(GramSize::Bigram, 3);
        store.insert_grams(narrow, &[bigram(1, 2, 1, 1, 1)]).unwrap();
        assert_eq!(store.gram_rows(wide).unwrap(), 0);
        assert_eq!(store.total_occurrences(wide).unwrap(), 0);
    }

    #[test]
    fn registry_and_meta_persist() {
        let store = SledStore::temporary().unwrap();
        assert!(store.meta().unwrap().is_none());
        store.write_meta(&StoreMeta::current()).unwrap();
        assert_eq!(store.meta().unwrap().unwrap().version, STORE_VERSION);

        let docs = vec![Document { id: 1, name: "a.txt".into(), size: 3, kind: crate::DocKind::Text }];
        store.insert_documents(&docs).unwrap();
        store.insert_words(&[Word { id: 1, value: "lei".into() }]).unwrap();
        assert_eq!(store.document_count().unwrap(), 1);
        assert_eq!(store.documents().unwrap(), docs);
        assert_eq!(store.words().unwrap()[0].value, "lei");
    }

    #[test]
    fn truncated_rows_are_errors() {
        let store = SledStore::temporary().unwrap();
        let table = GramTable::new(GramSize::Bigram, 1);
        store.insert_grams(table, &[bigram(1, 2, 1, 1, 3)]).unwrap();

        let by_doc = store.tree(&table.by_doc()).unwrap();
        by_doc.insert(2u32.to_be_bytes().to_vec(), vec![0u8, 1]).unwrap();
        assert!(matches!(store.grams(table), Err(Error::CorruptRow(_))));
        assert!(matches!(store.grouped_counts(table, 2, true), Err(Error::CorruptRow(_))));

        let by_key = store.tree(&table.by_key()).unwrap();
        // words (1, 2) and a jump byte, but no document id
        by_key.insert(vec![0u8, 0, 0, 1, 0, 0, 0, 2, 1], vec![0u8; 4]).unwrap();
        let key = GramKey { shape: Window::Bigram(1, 2, None), doc_id: None };
        assert!(matches!(store.distinct_documents(table, &key, false), Err(Error::CorruptRow(_))));

        store.tree("meta").unwrap().insert(table.total_key(), vec![1u8]).unwrap();
        assert!(matches!(store.total_occurrences(table), Err(Error::CorruptRow(_))));
    }
}
