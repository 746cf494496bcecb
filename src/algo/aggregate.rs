use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::state::Assignment;

/// Distinct word types in ascending order with their corpus frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vocabulary {
    pub terms: Vec<String>,
    pub frequencies: Vec<u64>,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Map term → column index.
    pub fn index(&self) -> HashMap<&str, usize> {
        self.terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect()
    }
}

/// Token counts per document, ordered by document index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocLengths {
    /// Document indices as they appear in the dump, ascending.
    pub ids: Vec<usize>,
    pub lengths: Vec<u64>,
}

/// Observed cells of a count matrix. Unobserved cells are implicitly zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseCounts {
    pub n_rows: usize,
    pub n_cols: usize,
    pub cells: BTreeMap<(usize, usize), u64>,
}

impl SparseCounts {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.cells.get(&(row, col)).copied().unwrap_or(0)
    }

    pub fn add(&mut self, row: usize, col: usize, count: u64) {
        debug_assert!(row < self.n_rows && col < self.n_cols);
        *self.cells.entry((row, col)).or_insert(0) += count;
    }

    pub fn total(&self) -> u64 {
        self.cells.values().sum()
    }

    /// Sum of each column over all rows.
    pub fn column_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.n_cols];
        for (&(_, c), &n) in &self.cells {
            totals[c] += n;
        }
        totals
    }
}

/// Group-and-count over any ordered key.
pub fn group_count<K: Ord>(keys: impl IntoIterator<Item = K>) -> BTreeMap<K, u64> {
    let mut counts = BTreeMap::new();
    for k in keys {
        *counts.entry(k).or_insert(0) += 1;
    }
    counts
}

/// Term frequency table: word type → number of occurrences.
pub fn term_frequencies(assignments: &[Assignment]) -> Vocabulary {
    let counts = group_count(assignments.iter().map(|a| a.token.as_str()));
    let (terms, frequencies) = counts
        .into_iter()
        .map(|(t, n)| (t.to_string(), n))
        .unzip();
    Vocabulary { terms, frequencies }
}

/// Document lengths in tokens.
pub fn doc_lengths(assignments: &[Assignment]) -> DocLengths {
    let counts = group_count(assignments.iter().map(|a| a.doc));
    let (ids, lengths) = counts.into_iter().unzip();
    DocLengths { ids, lengths }
}

/// Tokens per (topic, term). Rows are topics `0..num_topics`, columns follow `vocab`.
pub fn topic_term_counts(
    assignments: &[Assignment],
    vocab: &Vocabulary,
    num_topics: usize,
) -> SparseCounts {
    let index = vocab.index();
    let mut counts = SparseCounts::new(num_topics, vocab.len());
    let grouped = group_count(
        assignments
            .iter()
            .filter_map(|a| index.get(a.token.as_str()).map(|&w| (a.topic, w))),
    );
    for ((topic, term), n) in grouped {
        counts.add(topic, term, n);
    }
    counts
}

/// Tokens per (document, topic). Rows follow `doc_ids`, columns are topics.
pub fn doc_topic_counts(
    assignments: &[Assignment],
    doc_ids: &[usize],
    num_topics: usize,
) -> SparseCounts {
    let row_of: HashMap<usize, usize> = doc_ids.iter().enumerate().map(|(r, &d)| (d, r)).collect();
    let mut counts = SparseCounts::new(doc_ids.len(), num_topics);
    let grouped = group_count(
        assignments
            .iter()
            .filter_map(|a| row_of.get(&a.doc).map(|&r| (r, a.topic))),
    );
    for ((row, topic), n) in grouped {
        counts.add(row, topic, n);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(doc: usize, token: &str, topic: usize) -> Assignment {
        Assignment {
            doc,
            token: token.into(),
            topic,
        }
    }

    fn sample() -> Vec<Assignment> {
        vec![
            a(0, "b", 0),
            a(0, "a", 0),
            a(0, "b", 1),
            a(2, "c", 1),
            a(2, "b", 1),
        ]
    }

    #[test]
    fn vocabulary_is_sorted_with_counts() {
        let vocab = term_frequencies(&sample());
        assert_eq!(vocab.terms, vec!["a", "b", "c"]);
        assert_eq!(vocab.frequencies, vec![1, 3, 1]);
    }

    #[test]
    fn doc_lengths_skip_missing_documents() {
        let docs = doc_lengths(&sample());
        assert_eq!(docs.ids, vec![0, 2]);
        assert_eq!(docs.lengths, vec![3, 2]);
    }

    #[test]
    fn topic_term_counts_cover_every_token() {
        let rows = sample();
        let vocab = term_frequencies(&rows);
        let counts = topic_term_counts(&rows, &vocab, 3);
        assert_eq!((counts.n_rows, counts.n_cols), (3, 3));
        assert_eq!(counts.get(0, 1), 1);
        assert_eq!(counts.get(1, 1), 2);
        assert_eq!(counts.get(2, 0), 0);
        assert_eq!(counts.total(), rows.len() as u64);
    }

    #[test]
    fn column_totals_reproduce_term_frequencies() {
        let rows = sample();
        let vocab = term_frequencies(&rows);
        let counts = topic_term_counts(&rows, &vocab, 2);
        assert_eq!(counts.column_totals(), vocab.frequencies);
    }

    #[test]
    fn doc_topic_counts_use_row_positions() {
        let rows = sample();
        let docs = doc_lengths(&rows);
        let counts = doc_topic_counts(&rows, &docs.ids, 2);
        assert_eq!(counts.n_rows, 2);
        assert_eq!(counts.get(0, 0), 2);
        assert_eq!(counts.get(0, 1), 1);
        assert_eq!(counts.get(1, 0), 0);
        assert_eq!(counts.get(1, 1), 2);
    }

    #[test]
    fn empty_input() {
        let vocab = term_frequencies(&[]);
        assert!(vocab.is_empty());
        let counts = topic_term_counts(&[], &vocab, 4);
        assert_eq!(counts.total(), 0);
        assert_eq!(counts.n_rows, 4);
    }
}
