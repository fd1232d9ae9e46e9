use gramrank_core::tokenizer::tokenize;

#[test]
fn it_keeps_terms_verbatim() {
    let toks = tokenize("Running Runners RUN café's");
    assert_eq!(toks, vec!["Running", "Runners", "RUN", "café's"]);
}

#[test]
fn it_ignores_blank_input() {
    assert!(tokenize("").is_empty());
    assert!(tokenize(" \n\t ").is_empty());
}
