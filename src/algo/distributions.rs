//! Smoothed topic-term (`phi`) and document-topic (`theta`) distributions.
//!
//! Both matrices come out of the same pivot → add prior → L1-normalize step.
//! `phi` adds the scalar `beta` to every cell; `theta` adds `alpha[t]` to
//! column `t`, so the alpha vector must line up with the topic columns.

use serde::Serialize;

use super::aggregate::{self, SparseCounts};
use super::state::TopicState;
use crate::error::ValidationError;

/// Additive prior applied before normalization.
#[derive(Debug, Clone, Copy)]
pub enum Smoothing<'a> {
    /// Same value in every cell.
    Uniform(f64),
    /// One value per column.
    PerColumn(&'a [f64]),
}

/// The matrices and vectors a topic-model visualization consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelData {
    /// Topics × terms, rows sum to 1.
    pub topic_term_dists: Vec<Vec<f64>>,
    /// Documents × topics, rows sum to 1.
    pub doc_topic_dists: Vec<Vec<f64>>,
    pub doc_lengths: Vec<u64>,
    pub vocab: Vec<String>,
    pub term_frequency: Vec<u64>,
    /// Original document index of each `doc_topic_dists` row.
    pub doc_ids: Vec<usize>,
}

impl ModelData {
    pub fn num_topics(&self) -> usize {
        self.topic_term_dists.len()
    }
}

/// Dense matrix of the counts, zero where nothing was observed.
pub fn pivot(counts: &SparseCounts) -> Vec<Vec<f64>> {
    let mut matrix = vec![vec![0.0f64; counts.n_cols]; counts.n_rows];
    for (&(r, c), &n) in &counts.cells {
        matrix[r][c] = n as f64;
    }
    matrix
}

/// Divide every row by its sum. Fails if any row sums to zero.
pub fn normalize_rows(matrix: &mut [Vec<f64>]) -> Result<(), ValidationError> {
    for (r, row) in matrix.iter_mut().enumerate() {
        let sum: f64 = row.iter().sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(ValidationError::single(format!(
                "row {r} sums to {sum}; cannot normalize"
            )));
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    Ok(())
}

/// Pivot the counts, add the prior, and normalize each row to a distribution.
pub fn pivot_and_smooth(
    counts: &SparseCounts,
    smoothing: Smoothing<'_>,
) -> Result<Vec<Vec<f64>>, ValidationError> {
    let mut matrix = pivot(counts);
    match smoothing {
        Smoothing::Uniform(value) => {
            check_prior(value)?;
            for row in &mut matrix {
                row.iter_mut().for_each(|v| *v += value);
            }
        }
        Smoothing::PerColumn(values) => {
            if values.len() != counts.n_cols {
                return Err(ValidationError::single(format!(
                    "smoothing has {} values but the matrix has {} columns",
                    values.len(),
                    counts.n_cols
                )));
            }
            for &v in values {
                check_prior(v)?;
            }
            for row in &mut matrix {
                for (cell, &prior) in row.iter_mut().zip(values) {
                    *cell += prior;
                }
            }
        }
    }
    normalize_rows(&mut matrix)?;
    Ok(matrix)
}

fn check_prior(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::single(format!(
            "smoothing value {value} must be finite and non-negative"
        )))
    }
}

/// Build `phi`, `theta`, and the auxiliary vectors from a parsed dump.
pub fn build_distributions(state: &TopicState) -> Result<ModelData, ValidationError> {
    let k = state.num_topics();
    let assignments = &state.assignments;

    let vocab = aggregate::term_frequencies(assignments);
    let docs = aggregate::doc_lengths(assignments);
    log::debug!(
        "{} topics, {} documents, {} terms",
        k,
        docs.ids.len(),
        vocab.len()
    );

    let phi_counts = aggregate::topic_term_counts(assignments, &vocab, k);
    let phi = pivot_and_smooth(&phi_counts, Smoothing::Uniform(state.hyperparameters.beta))?;

    let theta_counts = aggregate::doc_topic_counts(assignments, &docs.ids, k);
    let theta = pivot_and_smooth(
        &theta_counts,
        Smoothing::PerColumn(&state.hyperparameters.alpha),
    )?;

    Ok(ModelData {
        topic_term_dists: phi,
        doc_topic_dists: theta,
        doc_lengths: docs.lengths,
        vocab: vocab.terms,
        term_frequency: vocab.frequencies,
        doc_ids: docs.ids,
    })
}

/// Unsmoothed topic × term counts, columns in vocabulary order.
pub fn raw_topic_term_matrix(state: &TopicState) -> Vec<Vec<f64>> {
    let vocab = aggregate::term_frequencies(&state.assignments);
    pivot(&aggregate::topic_term_counts(
        &state.assignments,
        &vocab,
        state.num_topics(),
    ))
}

pub fn row_sums(matrix: &[Vec<f64>]) -> Vec<f64> {
    matrix.iter().map(|row| row.iter().sum()).collect()
}
