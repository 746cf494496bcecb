//! Topic coordinates for bubble charts.
//!
//! Topics are compared by the Jensen-Shannon divergence of their term
//! distributions and projected to two dimensions. Bubble size is the topic's
//! share of the corpus, weighted by document length.

use std::str::FromStr;

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Deserializer, Serialize};

use super::distributions::ModelData;
use super::divergence::{js_distance_matrix, validate};
use super::rng::LcgRng;
use crate::error::{Error, ValidationError};

/// Eigenvalues below this are treated as zero.
const EIGEN_EPS: f64 = 1e-8;

/// Dimensionality reduction applied to the topic distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    /// Principal coordinate analysis (classical MDS).
    #[default]
    Pcoa,
    /// Metric MDS by stress majorization (SMACOF).
    Mmds,
    /// Exact t-SNE on the precomputed distances.
    Tsne,
}

impl Reducer {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pcoa => "pcoa",
            Self::Mmds => "mmds",
            Self::Tsne => "tsne",
        }
    }

    /// Project a square distance matrix to one 2D point per row.
    pub fn reduce(self, dist: &[Vec<f64>]) -> Vec<[f64; 2]> {
        match self {
            Self::Pcoa => pcoa(dist),
            Self::Mmds => smacof(dist, &pcoa(dist), SmacofParams::default()),
            Self::Tsne => tsne(dist, TsneParams::default()),
        }
    }
}

impl<'de> Deserialize<'de> for Reducer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        super::deserialize_from_str(deserializer)
    }
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pcoa" => Ok(Self::Pcoa),
            "mmds" => Ok(Self::Mmds),
            "tsne" => Ok(Self::Tsne),
            _ => Err(Error::InvalidOption {
                kind: "reducer",
                value: s.to_string(),
                expected: "pcoa, mmds, tsne",
            }),
        }
    }
}

/// Settings for [`topic_coordinates`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ScaleOptions {
    /// pcoa, mmds or tsne.
    pub reducer: Reducer,
    /// Order topics by descending mass instead of model order.
    pub sort_topics: bool,
}

impl Default for ScaleOptions {
    fn default() -> Self {
        Self {
            reducer: Reducer::Pcoa,
            sort_topics: true,
        }
    }
}

/// One bubble.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCoordinate {
    pub x: f64,
    pub y: f64,
    /// 1-based position in the output order.
    pub topic: usize,
    /// 0-based topic index in the model.
    pub model_topic: usize,
    /// Always 1; kept for renderers that group bubbles.
    pub cluster: usize,
    /// Share of the corpus, in percent.
    pub freq: f64,
}

/// Corpus share of each topic: `Σ_d theta[d][t] · len[d]`, normalized to sum to 1.
pub fn topic_proportions(doc_topic_dists: &[Vec<f64>], doc_lengths: &[u64]) -> Vec<f64> {
    let k = doc_topic_dists.first().map_or(0, Vec::len);
    let mut freq = vec![0.0f64; k];
    for (row, &len) in doc_topic_dists.iter().zip(doc_lengths) {
        for (f, &p) in freq.iter_mut().zip(row) {
            *f += p * len as f64;
        }
    }
    let total: f64 = freq.iter().sum();
    if total > 0.0 {
        freq.iter_mut().for_each(|f| *f /= total);
    } else if k > 0 {
        freq.iter_mut().for_each(|f| *f = 1.0 / k as f64);
    }
    freq
}

/// Validate the model, compute topic masses, and lay the topics out in 2D.
pub fn topic_coordinates(
    data: &ModelData,
    options: ScaleOptions,
) -> Result<Vec<TopicCoordinate>, ValidationError> {
    validate(data)?;
    let proportions = topic_proportions(&data.doc_topic_dists, &data.doc_lengths);

    let mut order: Vec<usize> = (0..proportions.len()).collect();
    if options.sort_topics {
        order.sort_by(|&a, &b| proportions[b].total_cmp(&proportions[a]));
    }

    let rows: Vec<Vec<f64>> = order
        .iter()
        .map(|&t| data.topic_term_dists[t].clone())
        .collect();
    let dist = js_distance_matrix(&rows);
    log::debug!(
        "scaling {} topics with {}",
        rows.len(),
        options.reducer.name()
    );
    let points = options.reducer.reduce(&dist);

    Ok(order
        .iter()
        .zip(points)
        .enumerate()
        .map(|(pos, (&t, [x, y]))| TopicCoordinate {
            x,
            y,
            topic: pos + 1,
            model_topic: t,
            cluster: 1,
            freq: proportions[t] * 100.0,
        })
        .collect())
}

/// Classical multidimensional scaling onto the top two principal axes.
pub fn pcoa(dist: &[Vec<f64>]) -> Vec<[f64; 2]> {
    let n = dist.len();
    if n == 0 {
        return vec![];
    }
    let squared = DMatrix::from_fn(n, n, |i, j| dist[i][j] * dist[i][j]);
    let centering = DMatrix::<f64>::identity(n, n) - DMatrix::from_element(n, n, 1.0 / n as f64);
    let b = (&centering * squared * &centering) * -0.5;
    // Symmetrize away rounding so the symmetric solver sees a symmetric input.
    let b = (&b + b.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(b);

    let mut axes: Vec<usize> = (0..n).collect();
    axes.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut coords = vec![[0.0f64; 2]; n];
    for (axis, &k) in axes.iter().take(2).enumerate() {
        let lambda = eigen.eigenvalues[k];
        if lambda <= EIGEN_EPS {
            continue;
        }
        let scale = lambda.sqrt();
        for (i, point) in coords.iter_mut().enumerate() {
            point[axis] = eigen.eigenvectors[(i, k)] * scale;
        }
    }
    coords
}

#[derive(Debug, Clone, Copy)]
pub struct SmacofParams {
    pub max_iter: usize,
    /// Stop when the relative stress improvement falls below this.
    pub eps: f64,
}

impl Default for SmacofParams {
    fn default() -> Self {
        Self {
            max_iter: 300,
            eps: 1e-6,
        }
    }
}

fn euclid(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Raw stress: `Σ_{i<j} (‖x_i − x_j‖ − d_ij)²`.
pub fn stress(dist: &[Vec<f64>], points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    let mut s = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            s += (euclid(&points[i], &points[j]) - dist[i][j]).powi(2);
        }
    }
    s
}

/// Metric MDS by the Guttman transform, starting from `init`.
pub fn smacof(dist: &[Vec<f64>], init: &[[f64; 2]], params: SmacofParams) -> Vec<[f64; 2]> {
    let n = dist.len();
    if n < 2 {
        return vec![[0.0; 2]; n];
    }
    let mut x: Vec<[f64; 2]> = init.to_vec();
    if x.iter().all(|p| p[0] == 0.0 && p[1] == 0.0) {
        let mut rng = LcgRng::new(0);
        x.iter_mut()
            .for_each(|p| *p = [rng.next_f64() - 0.5, rng.next_f64() - 0.5]);
    }

    let mut old_stress = stress(dist, &x);
    for _ in 0..params.max_iter {
        let mut next = vec![[0.0f64; 2]; n];
        for i in 0..n {
            let mut bii = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dij = euclid(&x[i], &x[j]);
                let bij = if dij > 0.0 { -dist[i][j] / dij } else { 0.0 };
                bii -= bij;
                next[i][0] += bij * x[j][0];
                next[i][1] += bij * x[j][1];
            }
            next[i][0] += bii * x[i][0];
            next[i][1] += bii * x[i][1];
        }
        for p in &mut next {
            p[0] /= n as f64;
            p[1] /= n as f64;
        }
        x = next;
        let new_stress = stress(dist, &x);
        if old_stress <= 0.0 || (old_stress - new_stress) / old_stress < params.eps {
            break;
        }
        old_stress = new_stress;
    }
    x
}

#[derive(Debug, Clone, Copy)]
pub struct TsneParams {
    pub perplexity: f64,
    pub max_iter: usize,
    pub exaggeration: f64,
    pub exaggeration_iter: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            max_iter: 1000,
            exaggeration: 12.0,
            exaggeration_iter: 250,
            learning_rate: 200.0,
            seed: 0,
        }
    }
}

/// Conditional affinities `P(j|i)` matched to the target perplexity by bisection.
fn conditional_affinities(dist: &[Vec<f64>], perplexity: f64) -> Vec<Vec<f64>> {
    let n = dist.len();
    let target = perplexity.ln();
    let mut p = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
        let mut beta = 1.0;
        for _ in 0..100 {
            let mut sum = 0.0;
            for j in 0..n {
                p[i][j] = if i == j { 0.0 } else { (-dist[i][j] * beta).exp() };
                sum += p[i][j];
            }
            let sum = sum.max(f64::MIN_POSITIVE);
            let mut weighted = 0.0;
            for j in 0..n {
                p[i][j] /= sum;
                weighted += dist[i][j] * p[i][j];
            }
            let entropy = sum.ln() + beta * weighted;
            let diff = entropy - target;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                lo = beta;
                beta = if hi.is_finite() { (beta + hi) / 2.0 } else { beta * 2.0 };
            } else {
                hi = beta;
                beta = if lo.is_finite() { (beta + lo) / 2.0 } else { beta / 2.0 };
            }
        }
    }
    p
}

/// Exact t-SNE with early exaggeration, momentum and per-parameter gains.
pub fn tsne(dist: &[Vec<f64>], params: TsneParams) -> Vec<[f64; 2]> {
    let n = dist.len();
    if n < 2 {
        return vec![[0.0; 2]; n];
    }
    let perplexity = params.perplexity.min((n - 1) as f64 / 3.0).max(1.0);
    let cond = conditional_affinities(dist, perplexity);
    let mut p = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in 0..n {
            p[i][j] = ((cond[i][j] + cond[j][i]) / (2.0 * n as f64)).max(1e-12);
        }
    }

    let mut rng = LcgRng::new(params.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.next_gaussian() * 1e-4, rng.next_gaussian() * 1e-4])
        .collect();
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];

    for iter in 0..params.max_iter {
        let (exaggeration, momentum) = if iter < params.exaggeration_iter {
            (params.exaggeration, 0.5)
        } else {
            (1.0, 0.8)
        };

        let mut num = vec![vec![0.0f64; n]; n];
        let mut z = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let d2 = (y[i][0] - y[j][0]).powi(2) + (y[i][1] - y[j][1]).powi(2);
                let q = 1.0 / (1.0 + d2);
                num[i][j] = q;
                num[j][i] = q;
                z += 2.0 * q;
            }
        }
        let z = z.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[i][j] / z).max(1e-12);
                let mult = 4.0 * (exaggeration * p[i][j] - q) * num[i][j];
                grad[0] += mult * (y[i][0] - y[j][0]);
                grad[1] += mult * (y[i][1] - y[j][1]);
            }
            for d in 0..2 {
                gains[i][d] = if (grad[d] > 0.0) != (update[i][d] > 0.0) {
                    gains[i][d] + 0.2
                } else {
                    (gains[i][d] * 0.8).max(0.01)
                };
                update[i][d] = momentum * update[i][d] - params.learning_rate * gains[i][d] * grad[d];
            }
        }
        for (point, step) in y.iter_mut().zip(&update) {
            point[0] += step[0];
            point[1] += step[1];
        }
        // Keep the embedding centred.
        let cx = y.iter().map(|p| p[0]).sum::<f64>() / n as f64;
        let cy = y.iter().map(|p| p[1]).sum::<f64>() / n as f64;
        for point in &mut y {
            point[0] -= cx;
            point[1] -= cy;
        }
    }
    y
}
