/// Split pre-cleaned text into terms on Unicode whitespace.
///
/// Corpus files and reference queries are normalized upstream, so terms are
/// taken verbatim: no case folding, stemming or stopword removal.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}
