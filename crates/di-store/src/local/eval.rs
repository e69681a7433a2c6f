//! Evaluation of filter expressions against stored documents.

use di_core::{CollectionSpec, Document, FilterExpr, TagValue};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Lowercased word tokens of `s`.
pub fn tokenize(s: &str) -> Vec<String> {
    RE_WORD.find_iter(s).map(|m| m.as_str().to_lowercase()).collect()
}

/// True when `query` has at least one word and every word is in `haystack`.
fn all_words_in(query: &str, haystack: &HashSet<String>) -> bool {
    let words = tokenize(query);
    !words.is_empty() && words.iter().all(|w| haystack.contains(w))
}

fn term_matches(stored: &TagValue, wanted: &TagValue) -> bool {
    match (stored, wanted) {
        (TagValue::Int(a), TagValue::Int(b)) => a == b,
        _ => match (stored.as_f64(), wanted.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < 1e-9,
            _ => stored == wanted,
        },
    }
}

fn text_words(doc: &Document, spec: &CollectionSpec) -> HashSet<String> {
    let mut words = HashSet::new();
    if spec.index_text {
        if let Some(text) = doc.text_content() {
            words.extend(tokenize(text));
        }
    }
    for key in &spec.tag_indices {
        if let Some(v) = doc.tags.get(key) {
            words.extend(tokenize(&v.to_string()));
        }
    }
    words
}

/// Evaluate `filter` against `doc`. A document without the filtered tag
/// never satisfies a leaf.
pub fn matches(filter: &FilterExpr, doc: &Document, spec: &CollectionSpec) -> bool {
    match filter {
        FilterExpr::Match { column, query } => match doc.tags.get(column).and_then(TagValue::as_str) {
            Some(value) => all_words_in(query, &tokenize(value).into_iter().collect()),
            None => false,
        },
        FilterExpr::Term { column, value } => {
            doc.tags.get(column).map_or(false, |stored| term_matches(stored, value))
        }
        FilterExpr::Range { column, range } => doc
            .tags
            .get(column)
            .and_then(TagValue::as_f64)
            .map_or(false, |v| range.contains(v)),
        FilterExpr::Text { query } => all_words_in(query, &text_words(doc, spec)),
        FilterExpr::And(items) => items.iter().all(|f| matches(f, doc, spec)),
        FilterExpr::Or(items) => items.iter().any(|f| matches(f, doc, spec)),
        FilterExpr::Not(inner) => !matches(inner, doc, spec),
    }
}
