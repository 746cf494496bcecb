//! Shared operation wrappers for all interfaces (CLI, MCP, plugin).
//!
//! Each `op_*` function is a synchronous wrapper around one or more `algo`
//! modules. Output is a `serde_json::Value`, so nothing here depends on rmcp,
//! clap, or nu-plugin.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::algo::{aggregate, clustering, distributions, keys, models, scaling, state};
use crate::error::Result;

/// Everything `cluster` can be asked for besides the linkage options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ClusterRequest {
    #[serde(flatten)]
    pub options: clustering::ClusterOptions,
    /// Cluster `phi` (true) or the raw topic-term counts (false).
    pub smoothed: bool,
    /// Report flat groups formed below this merge height.
    pub color_threshold: Option<f64>,
    /// Report this many flat groups.
    pub groups: Option<usize>,
    /// MALLET keys file to attach as topic keywords.
    pub keys: Option<String>,
}

impl Default for ClusterRequest {
    fn default() -> Self {
        Self {
            options: clustering::ClusterOptions::default(),
            smoothed: true,
            color_threshold: None,
            groups: None,
            keys: None,
        }
    }
}

// ── Operations ───────────────────────────────────────────────────────────────

pub fn op_state_info(path: &str) -> Result<Value> {
    let state = state::read_state_file(path)?;
    let vocab = aggregate::term_frequencies(&state.assignments);
    let docs = aggregate::doc_lengths(&state.assignments);
    let topic_sizes = aggregate::group_count(state.assignments.iter().map(|a| a.topic));
    let tokens_per_topic: Vec<u64> = (0..state.num_topics())
        .map(|t| topic_sizes.get(&t).copied().unwrap_or(0))
        .collect();

    Ok(json!({
        "path": path,
        "num_topics": state.num_topics(),
        "alpha": state.hyperparameters.alpha,
        "beta": state.hyperparameters.beta,
        "num_tokens": state.assignments.len(),
        "num_docs": docs.ids.len(),
        "vocab_size": vocab.len(),
        "tokens_per_topic": tokens_per_topic,
    }))
}

pub fn op_distributions(path: &str) -> Result<Value> {
    let state = state::read_state_file(path)?;
    let data = distributions::build_distributions(&state)?;
    Ok(serde_json::to_value(data)?)
}

/// Topic coordinates for one state file; optionally also written as CSV.
pub fn op_scale(
    path: &str,
    options: scaling::ScaleOptions,
    csv_out: Option<&str>,
) -> Result<Value> {
    let state = state::read_state_file(path)?;
    let data = distributions::build_distributions(&state)?;
    let coords = scaling::topic_coordinates(&data, options)?;
    if let Some(out) = csv_out {
        models::write_topic_scaled_file(out, &coords)?;
        log::info!("wrote {} topic coordinates to {out}", coords.len());
    }
    Ok(serde_json::to_value(coords)?)
}

pub fn op_cluster(path: &str, request: &ClusterRequest) -> Result<Value> {
    let state = state::read_state_file(path)?;
    let matrix = if request.smoothed {
        distributions::build_distributions(&state)?.topic_term_dists
    } else {
        distributions::raw_topic_term_matrix(&state)
    };
    let dendrogram = clustering::cluster_topics(&matrix, request.options)?;
    let mut out = dendrogram_json(&dendrogram, request);
    if let Some(keys_path) = &request.keys {
        attach_keywords(&mut out, keys_path, dendrogram.n)?;
    }
    Ok(out)
}

/// Dendrogram fields shared by single and batch clustering.
fn dendrogram_json(dendrogram: &clustering::Dendrogram, request: &ClusterRequest) -> Value {
    let options = dendrogram.options;
    let mut out = json!({
        "labels": dendrogram.labels,
        "leaves": dendrogram.leaves,
        "ordered_labels": dendrogram
            .leaves
            .iter()
            .map(|&l| dendrogram.labels[l].as_str())
            .collect::<Vec<_>>(),
        "merges": dendrogram.merges,
        "tree": dendrogram.tree(),
        "metric": options.metric,
        "linkage": options.linkage,
        "orientation": options.orientation,
        "smoothed": request.smoothed,
        "color_threshold": request.color_threshold,
    });

    if let Some(h) = request.color_threshold {
        out["threshold_groups"] = json!(clustering::cut_at_height(dendrogram, h));
    }
    if let Some(k) = request.groups {
        out["groups"] = json!(clustering::cut_tree(dendrogram, k));
    }
    out
}

fn attach_keywords(out: &mut Value, keys_path: impl AsRef<Path>, n: usize) -> Result<()> {
    let keys_path = keys_path.as_ref();
    let topic_keys = keys::read_keys_file(keys_path)?;
    if topic_keys.len() != n {
        log::warn!(
            "{} has {} topics but the model has {n}",
            keys_path.display(),
            topic_keys.len(),
        );
    }
    let keywords: serde_json::Map<String, Value> = topic_keys
        .into_iter()
        .map(|k| (k.label, Value::String(k.words)))
        .collect();
    out["keywords"] = Value::Object(keywords);
    Ok(())
}

/// Write `topic_scaled.csv` for every model under `root`.
pub fn op_scale_models(root: &str, options: scaling::ScaleOptions) -> Result<Value> {
    let found = models::discover_models(root)?;
    let outcomes = models::scale_models(&found, options);

    let mut failed = 0usize;
    let rows: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| {
            let m = outcome.model;
            match outcome.result {
                Ok(coords) => json!({
                    "name": m.name,
                    "topics": m.topics,
                    "status": "ok",
                    "output": m.scaled,
                    "num_topics": coords.len(),
                }),
                Err(e) => {
                    failed += 1;
                    json!({
                        "name": m.name,
                        "topics": m.topics,
                        "status": "error",
                        "error": e.to_string(),
                    })
                }
            }
        })
        .collect();

    Ok(json!({
        "root": Path::new(root),
        "reducer": options.reducer,
        "models": rows,
        "failed": failed,
    }))
}

/// Cluster every model under `root` with each metric × linkage pair.
///
/// An empty `metrics` or `linkages` list falls back to the request's own
/// option. Keywords come from each model's `keys{N}.txt` when it exists;
/// `request.keys` is not used here.
pub fn op_cluster_models(
    root: &str,
    metrics: &[clustering::Metric],
    linkages: &[clustering::Linkage],
    request: &ClusterRequest,
) -> Result<Value> {
    let metrics = if metrics.is_empty() {
        vec![request.options.metric]
    } else {
        metrics.to_vec()
    };
    let linkages = if linkages.is_empty() {
        vec![request.options.linkage]
    } else {
        linkages.to_vec()
    };
    let settings = models::cluster_settings(&metrics, &linkages, request.options.orientation);
    let found = models::discover_models(root)?;
    let outcomes = models::cluster_models(&found, &settings, request.smoothed);

    let mut failed = 0usize;
    let mut rows = Vec::new();
    for outcome in outcomes {
        let m = outcome.model;
        let per_setting = match outcome.result {
            Ok(per_setting) => per_setting,
            Err(e) => {
                failed += settings.len();
                for options in &settings {
                    rows.push(json!({
                        "name": m.name,
                        "topics": m.topics,
                        "metric": options.metric,
                        "linkage": options.linkage,
                        "status": "error",
                        "error": e.to_string(),
                    }));
                }
                continue;
            }
        };
        for setting in per_setting {
            let row: Result<Value> = setting
                .result
                .map_err(Into::into)
                .and_then(|dendrogram| {
                    let mut out = dendrogram_json(&dendrogram, request);
                    if m.keys.is_file() {
                        attach_keywords(&mut out, &m.keys, dendrogram.n)?;
                    }
                    Ok(out)
                });
            rows.push(match row {
                Ok(mut out) => {
                    out["name"] = json!(m.name);
                    out["topics"] = json!(m.topics);
                    out["status"] = json!("ok");
                    out
                }
                Err(e) => {
                    failed += 1;
                    json!({
                        "name": m.name,
                        "topics": m.topics,
                        "metric": setting.options.metric,
                        "linkage": setting.options.linkage,
                        "status": "error",
                        "error": e.to_string(),
                    })
                }
            });
        }
    }

    Ok(json!({
        "root": Path::new(root),
        "settings": settings
            .iter()
            .map(|s| json!({"metric": s.metric, "linkage": s.linkage}))
            .collect::<Vec<_>>(),
        "smoothed": request.smoothed,
        "results": rows,
        "failed": failed,
    }))
}
