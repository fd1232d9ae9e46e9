//! Reading cleaned corpus files from disk.

use crate::error::Result;
use crate::index::DocKind;
use crate::tokenizer::tokenize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Raw text of one corpus file, before registration assigns it an id.
#[derive(Debug, Clone)]
pub struct SourceDoc {
    pub name: String,
    pub kind: DocKind,
    pub size: u64,
    pub text: String,
}

impl SourceDoc {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        let text = text.into();
        Self { kind: DocKind::from_name(&name), size: text.len() as u64, name, text }
    }

    pub fn tokens(&self) -> Vec<&str> {
        tokenize(&self.text)
    }
}

/// Loads every `.txt` file under `dir`, sorted by name. A document is named
/// by its `/`-separated path relative to `dir`, so equal file names in
/// different subdirectories stay distinct.
pub fn read_corpus_dir(dir: impl AsRef<Path>) -> Result<Vec<SourceDoc>> {
    let root = dir.as_ref();
    let mut docs = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if !p.is_file() || p.extension().and_then(|s| s.to_str()) != Some("txt") {
            continue;
        }
        let rel = p.strip_prefix(root).unwrap_or(p);
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        let name = match parts {
            Some(parts) => parts.join("/"),
            None => continue,
        };
        let text = fs::read_to_string(p)?;
        docs.push(SourceDoc::new(name, text));
    }
    docs.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!(dir = %root.display(), num_docs = docs.len(), "read corpus directory");
    Ok(docs)
}
