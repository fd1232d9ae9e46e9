//! Gram model: a 1-3 word window with optional skip distances, tied to one
//! document, plus the cache keys derived from it.

use crate::config::GramSize;
use crate::{DocId, WordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Skip distance between two words of a window. `None` is the "no jump"
/// state and is distinct from every concrete distance.
pub type Jump = Option<i8>;

/// The words of one window and the jumps between them.
///
/// Generic over the term representation so the extractor can work on raw
/// tokens and the index on word ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Window<T> {
    Unigram(T),
    Bigram(T, T, Jump),
    Trigram(T, T, T, Jump, Jump),
}

impl<T> Window<T> {
    pub fn size(&self) -> GramSize {
        match self {
            Window::Unigram(..) => GramSize::Unigram,
            Window::Bigram(..) => GramSize::Bigram,
            Window::Trigram(..) => GramSize::Trigram,
        }
    }

    pub fn terms(&self) -> Vec<&T> {
        match self {
            Window::Unigram(w0) => vec![w0],
            Window::Bigram(w0, w1, _) => vec![w0, w1],
            Window::Trigram(w0, w1, w2, _, _) => vec![w0, w1, w2],
        }
    }

    pub fn jumps(&self) -> [Jump; 2] {
        match self {
            Window::Unigram(_) => [None, None],
            Window::Bigram(_, _, j0) => [*j0, None],
            Window::Trigram(_, _, _, j0, j1) => [*j0, *j1],
        }
    }

    /// Same terms with every jump cleared.
    pub fn without_jumps(self) -> Self {
        match self {
            Window::Unigram(w0) => Window::Unigram(w0),
            Window::Bigram(w0, w1, _) => Window::Bigram(w0, w1, None),
            Window::Trigram(w0, w1, w2, _, _) => Window::Trigram(w0, w1, w2, None, None),
        }
    }

    /// Converts every term, stopping at the first failure.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Window<U>, E> {
        Ok(match self {
            Window::Unigram(w0) => Window::Unigram(f(w0)?),
            Window::Bigram(w0, w1, j0) => Window::Bigram(f(w0)?, f(w1)?, j0),
            Window::Trigram(w0, w1, w2, j0, j1) => Window::Trigram(f(w0)?, f(w1)?, f(w2)?, j0, j1),
        })
    }
}

/// One occurrence pattern of a window inside one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gram {
    pub shape: Window<WordId>,
    pub doc_id: DocId,
    pub count: u32,
}

impl Gram {
    pub fn new(shape: Window<WordId>, doc_id: DocId) -> Self {
        Self { shape, doc_id, count: 1 }
    }

    pub fn key(&self, include_jumps: bool, include_doc: bool) -> GramKey {
        let shape = if include_jumps { self.shape } else { self.shape.without_jumps() };
        GramKey { shape, doc_id: include_doc.then_some(self.doc_id) }
    }
}

/// Deterministic cache key of a gram.
///
/// Two grams yield equal keys exactly when their word ids, their jumps (if
/// included) and their document (if included) are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GramKey {
    pub shape: Window<WordId>,
    pub doc_id: Option<DocId>,
}

impl GramKey {
    pub fn without_doc(self) -> Self {
        Self { shape: self.shape, doc_id: None }
    }

    pub fn without_jumps(self) -> Self {
        Self { shape: self.shape.without_jumps(), doc_id: self.doc_id }
    }

    pub fn has_jumps(&self) -> bool {
        self.shape.jumps().iter().any(Option::is_some)
    }
}

impl fmt::Display for GramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.shape.terms().iter().map(|w| format!("{w:05}")).collect();
        f.write_str(&words.join("-"))?;
        if self.has_jumps() {
            f.write_str("-")?;
            let arity = self.shape.size().get() - 1;
            for jump in &self.shape.jumps()[..arity] {
                match jump {
                    Some(j) => write!(f, "{j}")?,
                    None => f.write_str("n")?,
                }
            }
        }
        if let Some(doc) = self.doc_id {
            write!(f, "-{doc:04}")?;
        }
        Ok(())
    }
}
