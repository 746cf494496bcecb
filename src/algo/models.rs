//! A directory of trained models, one `topics{N}` subdirectory per topic count.
//!
//! ```text
//! <root>/topics20/topic-state20.gz
//! <root>/topics20/keys20.txt
//! <root>/topics20/topic_scaled.csv   (written by scale_models)
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use super::clustering::{
    cluster_topics, ClusterOptions, Dendrogram, Linkage, Metric, Orientation,
};
use super::distributions::{build_distributions, raw_topic_term_matrix};
use super::scaling::{topic_coordinates, ScaleOptions, TopicCoordinate};
use super::state::read_state_file;
use crate::error::{ClusteringError, Result};

pub const SCALED_FILE: &str = "topic_scaled.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPaths {
    /// Directory name, e.g. `topics20`.
    pub name: String,
    pub topics: usize,
    pub state: PathBuf,
    pub keys: PathBuf,
    pub scaled: PathBuf,
}

/// Paths for the model with `topics` topics under `root`. Nothing is checked on disk.
pub fn model_paths(root: impl AsRef<Path>, topics: usize) -> ModelPaths {
    let name = format!("topics{topics}");
    let dir = root.as_ref().join(&name);
    ModelPaths {
        state: dir.join(format!("topic-state{topics}.gz")),
        keys: dir.join(format!("keys{topics}.txt")),
        scaled: dir.join(SCALED_FILE),
        name,
        topics,
    }
}

/// Every `topics{N}` subdirectory of `root`, sorted by `N`.
pub fn discover_models(root: impl AsRef<Path>) -> std::io::Result<Vec<ModelPaths>> {
    let root = root.as_ref();
    let mut models = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(topics) = name
            .to_str()
            .and_then(|n| n.strip_prefix("topics"))
            .and_then(|n| n.parse::<usize>().ok())
        else {
            continue;
        };
        models.push(model_paths(root, topics));
    }
    models.sort_by_key(|m| m.topics);
    log::debug!("found {} models under {}", models.len(), root.display());
    Ok(models)
}

/// `x,y,topics,cluster,Freq` rows without a header line.
pub fn write_topic_scaled<W: Write>(writer: W, coords: &[TopicCoordinate]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    for c in coords {
        csv_writer.serialize((c.x, c.y, c.topic, c.cluster, c.freq))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_topic_scaled_file(path: impl AsRef<Path>, coords: &[TopicCoordinate]) -> Result<()> {
    let file = fs::File::create(path.as_ref())?;
    write_topic_scaled(std::io::BufWriter::new(file), coords)
}

/// Read, scale and write one model.
pub fn scale_model(model: &ModelPaths, options: ScaleOptions) -> Result<Vec<TopicCoordinate>> {
    let state = read_state_file(&model.state)?;
    let data = build_distributions(&state)?;
    let coords = topic_coordinates(&data, options)?;
    write_topic_scaled_file(&model.scaled, &coords)?;
    Ok(coords)
}

pub struct ModelOutcome {
    pub model: ModelPaths,
    pub result: Result<Vec<TopicCoordinate>>,
}

/// Scale every model in parallel. A failing model is reported in its own
/// outcome and does not stop the others.
pub fn scale_models(models: &[ModelPaths], options: ScaleOptions) -> Vec<ModelOutcome> {
    models
        .par_iter()
        .map(|model| {
            let result = scale_model(model, options);
            match &result {
                Ok(coords) => log::info!(
                    "{}: wrote {} coordinates to {}",
                    model.name,
                    coords.len(),
                    model.scaled.display()
                ),
                Err(e) => log::warn!("{}: skipped: {e}", model.name),
            }
            ModelOutcome {
                model: model.clone(),
                result,
            }
        })
        .collect()
}

/// Every metric × linkage pair, metrics outermost. `orientation` is shared.
pub fn cluster_settings(
    metrics: &[Metric],
    linkages: &[Linkage],
    orientation: Orientation,
) -> Vec<ClusterOptions> {
    metrics
        .iter()
        .flat_map(|&metric| {
            linkages.iter().map(move |&linkage| ClusterOptions {
                metric,
                linkage,
                orientation,
            })
        })
        .collect()
}

pub struct SettingOutcome {
    pub options: ClusterOptions,
    pub result: std::result::Result<Dendrogram, ClusteringError>,
}

/// `result` fails as a whole when the model's state cannot be loaded.
pub struct ClusterOutcome {
    pub model: ModelPaths,
    pub result: Result<Vec<SettingOutcome>>,
}

/// Topic rows of one model: smoothed `phi`, or raw topic-term counts.
pub fn topic_matrix(model: &ModelPaths, smoothed: bool) -> Result<Vec<Vec<f64>>> {
    let state = read_state_file(&model.state)?;
    if smoothed {
        Ok(build_distributions(&state)?.topic_term_dists)
    } else {
        Ok(raw_topic_term_matrix(&state))
    }
}

/// Cluster every model under each setting. The state is read once per model;
/// models run in parallel and a failure stays inside its own outcome.
pub fn cluster_models(
    models: &[ModelPaths],
    settings: &[ClusterOptions],
    smoothed: bool,
) -> Vec<ClusterOutcome> {
    models
        .par_iter()
        .map(|model| {
            let result = topic_matrix(model, smoothed).map(|matrix| {
                settings
                    .iter()
                    .map(|&options| {
                        let result = cluster_topics(&matrix, options);
                        match &result {
                            Ok(_) => log::info!(
                                "{}: clustered with {} distance and {} linkage",
                                model.name,
                                options.metric.name(),
                                options.linkage.name()
                            ),
                            Err(e) => log::warn!(
                                "{}: {} / {} skipped: {e}",
                                model.name,
                                options.metric.name(),
                                options.linkage.name()
                            ),
                        }
                        SettingOutcome { options, result }
                    })
                    .collect()
            });
            if let Err(e) = &result {
                log::warn!("{}: skipped: {e}", model.name);
            }
            ClusterOutcome {
                model: model.clone(),
                result,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(topic: usize, x: f64, freq: f64) -> TopicCoordinate {
        TopicCoordinate {
            x,
            y: -x,
            topic,
            model_topic: topic - 1,
            cluster: 1,
            freq,
        }
    }

    #[test]
    fn model_paths_follow_layout() {
        let m = model_paths("/data/models", 20);
        assert_eq!(m.name, "topics20");
        assert_eq!(m.state, Path::new("/data/models/topics20/topic-state20.gz"));
        assert_eq!(m.keys, Path::new("/data/models/topics20/keys20.txt"));
        assert_eq!(m.scaled, Path::new("/data/models/topics20/topic_scaled.csv"));
    }

    #[test]
    fn discovers_only_topic_dirs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["topics20", "topics5", "topicsX", "other"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("topics7"), "not a dir").unwrap();
        let models = discover_models(dir.path()).unwrap();
        let topics: Vec<usize> = models.iter().map(|m| m.topics).collect();
        assert_eq!(topics, vec![5, 20]);
    }

    #[test]
    fn csv_has_no_header() {
        let mut buf = Vec::new();
        write_topic_scaled(&mut buf, &[coord(1, 0.5, 60.0), coord(2, -0.25, 40.0)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "0.5,-0.5,1,1,60.0\n-0.25,0.25,2,1,40.0\n");
    }

    #[test]
    fn missing_state_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("topics3")).unwrap();
        let models = discover_models(dir.path()).unwrap();
        let outcomes = scale_models(&models, ScaleOptions::default());
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_err());
        assert!(!outcomes[0].model.scaled.exists());
    }

    #[test]
    fn settings_cover_every_pair() {
        let settings = cluster_settings(
            &[Metric::Euclidean, Metric::Cosine],
            &[Linkage::Average, Linkage::Ward],
            Orientation::Left,
        );
        let pairs: Vec<(Metric, Linkage)> =
            settings.iter().map(|s| (s.metric, s.linkage)).collect();
        assert_eq!(
            pairs,
            vec![
                (Metric::Euclidean, Linkage::Average),
                (Metric::Euclidean, Linkage::Ward),
                (Metric::Cosine, Linkage::Average),
                (Metric::Cosine, Linkage::Ward),
            ]
        );
        assert!(settings.iter().all(|s| s.orientation == Orientation::Left));
    }

    #[test]
    fn unreadable_model_does_not_stop_clustering() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("topics2");
        fs::create_dir(&good).unwrap();
        let mut enc = GzEncoder::new(
            fs::File::create(good.join("topic-state2.gz")).unwrap(),
            Compression::default(),
        );
        enc.write_all(
            b"#doc source pos typeindex type topic\n#alpha : 0.5 0.5\n#beta : 0.1\n\
              0 NA 0 0 a 0\n0 NA 1 1 b 1\n1 NA 0 1 b 1\n",
        )
        .unwrap();
        enc.finish().unwrap();
        let bad = dir.path().join("topics4");
        fs::create_dir(&bad).unwrap();
        fs::write(bad.join("topic-state4.gz"), "plain text").unwrap();

        let models = discover_models(dir.path()).unwrap();
        let settings = cluster_settings(
            &[Metric::Euclidean, Metric::Cosine],
            &[Linkage::Single],
            Default::default(),
        );
        let outcomes = cluster_models(&models, &settings, true);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].model.topics, 2);
        let per_setting = outcomes[0].result.as_ref().unwrap();
        assert_eq!(per_setting.len(), 2);
        assert!(per_setting.iter().all(|s| s.result.is_ok()));
        assert_eq!(per_setting[1].options.metric, Metric::Cosine);
        assert!(outcomes[1].result.is_err());
    }
}
