//! Schema fragment selection.
//!
//! Scores each table by how many question terms appear in its name, its
//! description, or its column names, then fills the character budget in
//! score order. Ties break on qualified name so the result is deterministic.

use std::collections::BTreeSet;

use crate::catalog::SchemaDescriptor;

const STOPWORDS: &[&str] = &[
    "all", "and", "are", "between", "did", "does", "during", "each", "for", "from", "give", "had",
    "has", "have", "how", "into", "list", "many", "much", "over", "per", "show", "that", "the",
    "this", "was", "were", "what", "when", "where", "which", "who", "with",
];

/// Normalizes a word to a comparable term, or `None` for noise.
fn term(word: &str) -> Option<String> {
    let word = word.to_lowercase();
    if word.len() < 3 || STOPWORDS.contains(&word.as_str()) || word.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match word.strip_suffix('s') {
        Some(stem) if stem.len() >= 3 => Some(stem.to_string()),
        _ => Some(word),
    }
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter_map(term)
        .collect()
}

/// Terms describing a table. Name and column parts split on `_`.
fn table_terms(table: &SchemaDescriptor) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut strong = terms(&table.name);
    strong.extend(table.columns.iter().flat_map(|c| terms(&c.name)));
    let weak = terms(&table.description);
    (strong, weak)
}

/// Relevance of `table` to the question terms. Name and column matches count
/// double.
pub fn score(table: &SchemaDescriptor, question_terms: &BTreeSet<String>) -> usize {
    let (strong, weak) = table_terms(table);
    question_terms
        .iter()
        .map(|t| {
            if strong.contains(t) {
                2
            } else if weak.contains(t) {
                1
            } else {
                0
            }
        })
        .sum()
}

/// Picks the tables to show the generator.
///
/// `fallback` names the core subset used when no table scores. At least one
/// table is always returned when `candidates` is non-empty, even if it alone
/// exceeds `char_budget`.
pub fn select_tables<'a>(
    question: &str,
    extra_terms: &[&str],
    candidates: &'a [SchemaDescriptor],
    fallback: &[String],
    char_budget: usize,
) -> Vec<&'a SchemaDescriptor> {
    let mut question_terms = terms(question);
    question_terms.extend(extra_terms.iter().filter_map(|t| term(t)));

    let mut ranked: Vec<(usize, &SchemaDescriptor)> = candidates
        .iter()
        .map(|t| (score(t, &question_terms), t))
        .filter(|(s, _)| *s > 0)
        .collect();
    ranked.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| a.qualified_name().cmp(&b.qualified_name()))
    });

    let mut ordered: Vec<&SchemaDescriptor> = ranked.into_iter().map(|(_, t)| t).collect();
    if ordered.is_empty() {
        ordered = fallback
            .iter()
            .filter_map(|name| candidates.iter().find(|t| t.matches_name(name)))
            .collect();
    }
    if ordered.is_empty() {
        ordered = candidates.iter().collect();
    }

    let mut selected = Vec::new();
    let mut used = 0;
    for table in ordered {
        let size = table.format_for_llm().len();
        if !selected.is_empty() && used + size > char_budget {
            continue;
        }
        used += size;
        selected.push(table);
    }
    selected
}
