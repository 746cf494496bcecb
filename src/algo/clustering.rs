use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ClusteringError, Error};

/// Linkage method for HAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Min distance between any pair of points in two clusters.
    Single,
    /// Max distance between any pair of points in two clusters.
    Complete,
    /// Average distance between all pairs of points.
    #[default]
    Average,
    /// Ward's method: minimizes total within-cluster variance.
    Ward,
}

impl Linkage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Complete => "complete",
            Self::Average => "average",
            Self::Ward => "ward",
        }
    }
}

impl<'de> Deserialize<'de> for Linkage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        super::deserialize_from_str(deserializer)
    }
}

impl FromStr for Linkage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            "average" => Ok(Self::Average),
            "ward" => Ok(Self::Ward),
            _ => Err(Error::InvalidOption {
                kind: "linkage",
                value: s.to_string(),
                expected: "single, complete, average, ward",
            }),
        }
    }
}

/// Distance between two topic rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`; rows with zero norm are at distance 1 from everything.
    Cosine,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
        }
    }

    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Self::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                let sim = if na > 0.0 && nb > 0.0 {
                    dot / (na * nb)
                } else {
                    0.0
                };
                (1.0 - sim).max(0.0)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        super::deserialize_from_str(deserializer)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            _ => Err(Error::InvalidOption {
                kind: "metric",
                value: s.to_string(),
                expected: "euclidean, cosine",
            }),
        }
    }
}

/// Which side the dendrogram root is drawn on. Only passed through to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl<'de> Deserialize<'de> for Orientation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        super::deserialize_from_str(deserializer)
    }
}

impl FromStr for Orientation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(Error::InvalidOption {
                kind: "orientation",
                value: s.to_string(),
                expected: "top, bottom, left, right",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ClusterOptions {
    /// Row distance: euclidean or cosine.
    pub metric: Metric,
    /// Linkage: single, complete, average or ward.
    pub linkage: Linkage,
    /// Where the root is drawn: top, bottom, left or right.
    pub orientation: Orientation,
}

/// Result of HAC: merge steps in scipy's linkage convention.
///
/// Leaves are `0..n`; the cluster created by merge step `s` has id `n + s`.
#[derive(Debug, Clone, Serialize)]
pub struct Dendrogram {
    pub labels: Vec<String>,
    pub merges: Vec<Merge>,
    /// Leaf ids in left-to-right drawing order.
    pub leaves: Vec<usize>,
    pub n: usize,
    pub options: ClusterOptions,
}

/// A single merge step in the dendrogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

/// Nested form of the dendrogram for renderers that want a tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DendrogramNode {
    Leaf {
        id: usize,
        label: String,
    },
    Cluster {
        id: usize,
        height: f64,
        size: usize,
        children: Vec<DendrogramNode>,
    },
}

impl Dendrogram {
    /// Root of the merge tree.
    pub fn tree(&self) -> DendrogramNode {
        self.node(self.n + self.merges.len() - 1)
    }

    fn node(&self, id: usize) -> DendrogramNode {
        if id < self.n {
            return DendrogramNode::Leaf {
                id,
                label: self.labels[id].clone(),
            };
        }
        let m = &self.merges[id - self.n];
        DendrogramNode::Cluster {
            id,
            height: m.height,
            size: m.size,
            children: vec![self.node(m.left), self.node(m.right)],
        }
    }
}

/// `Topic1` .. `TopicN`.
pub fn topic_labels(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Topic{i}")).collect()
}

/// Cluster the rows of a topic-term matrix.
pub fn cluster_topics(
    matrix: &[Vec<f64>],
    options: ClusterOptions,
) -> Result<Dendrogram, ClusteringError> {
    let n = matrix.len();
    if n == 0 {
        return Err(ClusteringError("topic-term matrix is empty".into()));
    }
    if n < 2 {
        return Err(ClusteringError(format!(
            "need at least 2 topics to cluster, got {n}"
        )));
    }
    let width = matrix[0].len();
    if matrix.iter().any(|row| row.len() != width) {
        return Err(ClusteringError("topic-term matrix rows differ in length".into()));
    }
    if matrix.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ClusteringError("topic-term matrix has non-finite values".into()));
    }

    let distances = pairwise_distances(matrix, options.metric);
    if let Some(pos) = distances.iter().position(|d| !d.is_finite()) {
        return Err(ClusteringError(format!(
            "{} distance {pos} of the condensed matrix is not finite",
            options.metric.name()
        )));
    }
    let merges = hac(&distances, n, options.linkage);
    log::debug!(
        "clustered {n} topics ({}, {})",
        options.metric.name(),
        options.linkage.name()
    );
    let leaves = leaf_order(&merges, n);
    Ok(Dendrogram {
        labels: topic_labels(n),
        merges,
        leaves,
        n,
        options,
    })
}

/// Perform Hierarchical Agglomerative Clustering on a distance matrix.
///
/// `distances` is a flat upper-triangular distance matrix of size n*(n-1)/2.
/// Index for pair (i,j) where i < j: i*n - i*(i+1)/2 + j - i - 1
pub fn hac(distances: &[f64], n: usize, linkage: Linkage) -> Vec<Merge> {
    let mut dist = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let idx = condensed_index(i, j, n);
            dist[i][j] = distances[idx];
            dist[j][i] = distances[idx];
        }
    }

    let mut active: Vec<bool> = vec![true; n];
    let mut sizes: Vec<usize> = vec![1; n];
    let mut merges: Vec<Merge> = Vec::with_capacity(n.saturating_sub(1));
    // Slot i holds the current cluster id living at row i.
    let mut cluster_id: Vec<usize> = (0..n).collect();
    let mut next_id = n;

    for _ in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize)> = None;
        let mut best_dist = f64::INFINITY;

        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                // The first active pair is taken even when nothing compares less.
                if best.is_none() || dist[i][j] < best_dist {
                    best_dist = dist[i][j];
                    best = Some((i, j));
                }
            }
        }
        let Some((best_i, best_j)) = best else {
            break;
        };

        let new_size = sizes[best_i] + sizes[best_j];
        let (a, b) = (cluster_id[best_i], cluster_id[best_j]);
        merges.push(Merge {
            left: a.min(b),
            right: a.max(b),
            height: best_dist,
            size: new_size,
        });

        // Lance-Williams update: merge best_j into best_i
        for k in 0..n {
            if !active[k] || k == best_i || k == best_j {
                continue;
            }
            let ni = sizes[best_i] as f64;
            let nj = sizes[best_j] as f64;
            let new_dist = match linkage {
                Linkage::Single => dist[best_i][k].min(dist[best_j][k]),
                Linkage::Complete => dist[best_i][k].max(dist[best_j][k]),
                Linkage::Average => (ni * dist[best_i][k] + nj * dist[best_j][k]) / (ni + nj),
                Linkage::Ward => {
                    let nk = sizes[k] as f64;
                    let total = ni + nj + nk;
                    (((ni + nk) * dist[best_i][k].powi(2) + (nj + nk) * dist[best_j][k].powi(2)
                        - nk * best_dist.powi(2))
                        / total)
                        .max(0.0)
                        .sqrt()
                }
            };
            dist[best_i][k] = new_dist;
            dist[k][best_i] = new_dist;
        }

        active[best_j] = false;
        sizes[best_i] = new_size;
        cluster_id[best_i] = next_id;
        next_id += 1;
    }

    merges
}

/// Leaves from a depth-first walk of the tree, left child first.
pub fn leaf_order(merges: &[Merge], n: usize) -> Vec<usize> {
    if merges.is_empty() {
        return (0..n).collect();
    }
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![n + merges.len() - 1];
    while let Some(id) = stack.pop() {
        if id < n {
            order.push(id);
        } else {
            let m = &merges[id - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    order
}

/// Cut the dendrogram at a given number of clusters.
/// Returns a vector mapping each original item to a cluster label 0..k-1.
pub fn cut_tree(dendrogram: &Dendrogram, k: usize) -> Vec<usize> {
    let n = dendrogram.n;
    if k >= n {
        return (0..n).collect();
    }
    let num_merges = n - k.max(1);
    flat_labels(n, dendrogram.merges.iter().enumerate().take(num_merges))
}

/// Flat clusters formed by every merge at or below `height`.
pub fn cut_at_height(dendrogram: &Dendrogram, height: f64) -> Vec<usize> {
    flat_labels(
        dendrogram.n,
        dendrogram
            .merges
            .iter()
            .enumerate()
            .filter(|(_, m)| m.height <= height),
    )
}

fn flat_labels<'a>(n: usize, applied: impl Iterator<Item = (usize, &'a Merge)>) -> Vec<usize> {
    let mut parent: HashMap<usize, usize> = HashMap::new();
    for (step, merge) in applied {
        let new_id = n + step;
        parent.insert(merge.left, new_id);
        parent.insert(merge.right, new_id);
    }

    // Find root for each original item
    let find_root = |mut id: usize| -> usize {
        while let Some(&p) = parent.get(&id) {
            id = p;
        }
        id
    };

    let roots: Vec<usize> = (0..n).map(find_root).collect();

    // Map unique roots to sequential labels
    let mut label_map: HashMap<usize, usize> = HashMap::new();
    let mut next_label = 0;
    roots
        .iter()
        .map(|&r| {
            *label_map.entry(r).or_insert_with(|| {
                let l = next_label;
                next_label += 1;
                l
            })
        })
        .collect()
}

/// Condensed distance matrix over the rows of `matrix`.
pub fn pairwise_distances(matrix: &[Vec<f64>], metric: Metric) -> Vec<f64> {
    let n = matrix.len();
    let mut distances = vec![0.0; n * n.saturating_sub(1) / 2];
    for i in 0..n {
        for j in (i + 1)..n {
            distances[condensed_index(i, j, n)] = metric.distance(&matrix[i], &matrix[j]);
        }
    }
    distances
}

/// Index into a condensed distance matrix for pair (i, j) where i < j.
fn condensed_index(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < j);
    i * n - i * (i + 1) / 2 + j - i - 1
}
