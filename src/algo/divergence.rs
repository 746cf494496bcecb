use rayon::prelude::*;

use super::distributions::{row_sums, ModelData};
use crate::error::ValidationError;

/// Largest allowed deviation of a distribution row sum from 1.
pub const ROW_SUM_TOLERANCE: f64 = 1e-3;

/// Check that the model matrices agree with each other before scaling.
///
/// Every violated condition is reported, not only the first.
pub fn validate(data: &ModelData) -> Result<(), ValidationError> {
    let topics = data.topic_term_dists.len();
    let terms = data.topic_term_dists.first().map_or(0, Vec::len);
    let docs = data.doc_topic_dists.len();
    let dt_topics = data.doc_topic_dists.first().map_or(0, Vec::len);
    let mut problems = Vec::new();

    if data.topic_term_dists.iter().any(|r| r.len() != terms) {
        problems.push("topic_term_dists rows have differing lengths".to_string());
    }
    if data.doc_topic_dists.iter().any(|r| r.len() != dt_topics) {
        problems.push("doc_topic_dists rows have differing lengths".to_string());
    }
    if dt_topics != topics {
        problems.push(format!(
            "topic_term_dists has {topics} topic rows but doc_topic_dists has {dt_topics} topic columns"
        ));
    }
    if data.doc_lengths.len() != docs {
        problems.push(format!(
            "doc_lengths has {} entries but doc_topic_dists has {docs} document rows",
            data.doc_lengths.len()
        ));
    }
    if data.vocab.len() != terms {
        problems.push(format!(
            "vocab has {} terms but topic_term_dists has {terms} columns",
            data.vocab.len()
        ));
    }
    if data.term_frequency.len() != data.vocab.len() {
        problems.push(format!(
            "term_frequency has {} entries but vocab has {} terms",
            data.term_frequency.len(),
            data.vocab.len()
        ));
    }
    let bad_phi = count_unnormalized(&data.topic_term_dists);
    if bad_phi > 0 {
        problems.push(format!(
            "{bad_phi} of {topics} rows in topic_term_dists do not sum to 1"
        ));
    }
    let bad_theta = count_unnormalized(&data.doc_topic_dists);
    if bad_theta > 0 {
        problems.push(format!(
            "{bad_theta} of {docs} rows in doc_topic_dists do not sum to 1"
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { problems })
    }
}

fn count_unnormalized(matrix: &[Vec<f64>]) -> usize {
    row_sums(matrix)
        .into_iter()
        .filter(|s| s.is_nan() || (s - 1.0).abs() > ROW_SUM_TOLERANCE)
        .count()
}

/// Kullback-Leibler divergence in nats. Terms where `p` is zero contribute nothing.
fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|&(&pi, _)| pi > 0.0)
        .map(|(&pi, &qi)| pi * (pi / qi).ln())
        .sum()
}

fn normalized(v: &[f64]) -> Vec<f64> {
    let sum: f64 = v.iter().sum();
    if sum > 0.0 {
        v.iter().map(|x| x / sum).collect()
    } else {
        v.to_vec()
    }
}

/// Jensen-Shannon divergence between two distributions (natural log).
///
/// Inputs are renormalized first, so raw weights are accepted.
pub fn jensen_shannon(p: &[f64], q: &[f64]) -> f64 {
    let p = normalized(p);
    let q = normalized(q);
    let m: Vec<f64> = p.iter().zip(&q).map(|(a, b)| 0.5 * (a + b)).collect();
    let js = 0.5 * (kl_divergence(&p, &m) + kl_divergence(&q, &m));
    // Rounding can leave a tiny negative value for identical inputs.
    js.max(0.0)
}

/// Square, symmetric matrix of pairwise Jensen-Shannon divergences.
pub fn js_distance_matrix(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| jensen_shannon(&rows[i], &rows[j]))
                .collect()
        })
        .collect();

    let mut dist = vec![vec![0.0f64; n]; n];
    for (i, row) in upper.into_iter().enumerate() {
        for (offset, d) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn model() -> ModelData {
        ModelData {
            topic_term_dists: vec![vec![0.5, 0.3, 0.2], vec![0.1, 0.1, 0.8]],
            doc_topic_dists: vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.5, 0.5]],
            doc_lengths: vec![10, 20, 5],
            vocab: vec!["a".into(), "b".into(), "c".into()],
            term_frequency: vec![4, 3, 9],
            doc_ids: vec![0, 1, 2],
        }
    }

    #[test]
    fn consistent_model_passes() {
        assert!(validate(&model()).is_ok());
    }

    #[test]
    fn topic_mismatch_names_both_counts() {
        let mut m = model();
        m.doc_topic_dists = vec![vec![0.5, 0.25, 0.25]; 3];
        let err = validate(&m).unwrap_err();
        assert!(err
            .problems
            .iter()
            .any(|p| p.contains("2 topic rows") && p.contains("3 topic columns")));
    }

    #[test]
    fn reports_every_problem() {
        let mut m = model();
        m.doc_lengths.pop();
        m.term_frequency.push(1);
        m.topic_term_dists[0][0] = 0.9;
        let err = validate(&m).unwrap_err();
        assert_eq!(err.problems.len(), 3);
    }

    #[test]
    fn js_of_identical_is_zero() {
        let p = [0.2, 0.3, 0.5];
        assert!(jensen_shannon(&p, &p).abs() < 1e-12);
    }

    #[test]
    fn js_of_disjoint_is_ln2() {
        let js = jensen_shannon(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((js - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn distance_matrix_shape() {
        let d = js_distance_matrix(&model().topic_term_dists);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0][0], 0.0);
        assert_eq!(d[0][1], d[1][0]);
        assert!(d[0][1] > 0.0);
    }

    proptest! {
        #[test]
        fn distance_matrix_is_symmetric_with_zero_diagonal(
            rows in proptest::collection::vec(proptest::collection::vec(0.01f64..1.0, 5), 1..8)
        ) {
            let d = js_distance_matrix(&rows);
            for i in 0..rows.len() {
                prop_assert_eq!(d[i][i], 0.0);
                for j in 0..rows.len() {
                    prop_assert_eq!(d[i][j], d[j][i]);
                    prop_assert!(d[i][j] >= 0.0);
                    prop_assert!(d[i][j] <= std::f64::consts::LN_2 + 1e-9);
                }
            }
        }
    }
}
