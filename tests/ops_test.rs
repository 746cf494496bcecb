use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use nu_plugin_topicstate::algo::clustering::{ClusterOptions, Linkage, Metric};
use nu_plugin_topicstate::algo::divergence::jensen_shannon;
use nu_plugin_topicstate::algo::scaling::{Reducer, ScaleOptions};
use nu_plugin_topicstate::error::Error;
use nu_plugin_topicstate::ops::{self, ClusterRequest};
use serde_json::Value;

/// Two topics, three documents, vocabulary a/b/c.
const SMALL_STATE: &str = "#doc source pos typeindex type topic\n\
                           #alpha : 0.5 0.5\n\
                           #beta : 0.1\n\
                           0 NA 0 0 a 0\n\
                           0 NA 1 1 b 0\n\
                           0 NA 2 0 a 0\n\
                           1 NA 0 1 b 1\n\
                           1 NA 1 2 c 1\n\
                           2 NA 0 2 c 1\n\
                           2 NA 1 0 a 0\n";

fn write_gz(path: &Path, text: &str) {
    let file = fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn fixture(dir: &tempfile::TempDir, name: &str, text: &str) -> String {
    let path = dir.path().join(name);
    write_gz(&path, text);
    path.to_string_lossy().into_owned()
}

fn small_state() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "topic-state2.gz", SMALL_STATE);
    (dir, path)
}

fn matrix(value: &Value) -> Vec<Vec<f64>> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|row| {
            row.as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_f64().unwrap())
                .collect()
        })
        .collect()
}

#[test]
fn ops_state_info_reports_counts() {
    let (_dir, path) = small_state();
    let info = ops::op_state_info(&path).unwrap();
    assert_eq!(info["num_topics"], 2);
    assert_eq!(info["num_tokens"], 7);
    assert_eq!(info["num_docs"], 3);
    assert_eq!(info["vocab_size"], 3);
    assert_eq!(info["beta"], 0.1);
    assert_eq!(info["tokens_per_topic"], serde_json::json!([4, 3]));
}

#[test]
fn ops_distributions_shapes_and_sums() {
    let (_dir, path) = small_state();
    let data = ops::op_distributions(&path).unwrap();

    let phi = matrix(&data["topic_term_dists"]);
    assert_eq!(phi.len(), 2);
    assert!(phi.iter().all(|row| row.len() == 3));
    let theta = matrix(&data["doc_topic_dists"]);
    assert_eq!(theta.len(), 3);
    assert!(theta.iter().all(|row| row.len() == 2));
    for row in phi.iter().chain(&theta) {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    assert_eq!(data["vocab"], serde_json::json!(["a", "b", "c"]));
    assert_eq!(data["term_frequency"], serde_json::json!([3, 2, 2]));
    assert_eq!(data["doc_lengths"], serde_json::json!([3, 2, 2]));
    // topic 1: a=0, b=1, c=2 → (0.1, 1.1, 2.1) / 3.3
    assert!((phi[1][2] - 2.1 / 3.3).abs() < 1e-12);
}

#[test]
fn ops_scale_sorts_by_share_and_keeps_distances() {
    let (_dir, path) = small_state();
    let coords = ops::op_scale(&path, ScaleOptions::default(), None).unwrap();
    let coords = coords.as_array().unwrap();
    assert_eq!(coords.len(), 2);

    // topic 0 carries more weighted document mass than topic 1
    assert_eq!(coords[0]["model_topic"], 0);
    assert_eq!(coords[0]["topic"], 1);
    assert_eq!(coords[1]["topic"], 2);
    let f0 = coords[0]["freq"].as_f64().unwrap();
    let f1 = coords[1]["freq"].as_f64().unwrap();
    assert!(f0 > f1);
    assert!((f0 + f1 - 100.0).abs() < 1e-9);
    assert!(coords.iter().all(|c| c["cluster"] == 1));

    let data = ops::op_distributions(&path).unwrap();
    let phi = matrix(&data["topic_term_dists"]);
    let d = jensen_shannon(&phi[0], &phi[1]);
    let dx = coords[0]["x"].as_f64().unwrap() - coords[1]["x"].as_f64().unwrap();
    let dy = coords[0]["y"].as_f64().unwrap() - coords[1]["y"].as_f64().unwrap();
    assert!(((dx * dx + dy * dy).sqrt() - d).abs() < 1e-9);
}

#[test]
fn ops_scale_unsorted_keeps_model_order() {
    let (_dir, path) = small_state();
    let options = ScaleOptions {
        reducer: Reducer::Mmds,
        sort_topics: false,
    };
    let coords = ops::op_scale(&path, options, None).unwrap();
    let order: Vec<u64> = coords
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["model_topic"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1]);
}

#[test]
fn ops_scale_writes_headerless_csv() {
    let (dir, path) = small_state();
    let out = dir.path().join("topic_scaled.csv");
    ops::op_scale(&path, ScaleOptions::default(), out.to_str()).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let fields: Vec<&str> = lines[0].split(',').collect();
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[2], "1");
    assert_eq!(fields[3], "1");
    assert!(fields[0].parse::<f64>().is_ok());
}

#[test]
fn ops_cluster_two_topics_single_merge() {
    let (_dir, path) = small_state();
    let out = ops::op_cluster(&path, &ClusterRequest::default()).unwrap();
    assert_eq!(out["labels"], serde_json::json!(["Topic1", "Topic2"]));
    let merges = out["merges"].as_array().unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0]["left"], 0);
    assert_eq!(merges[0]["right"], 1);
    assert_eq!(merges[0]["size"], 2);
    assert!(merges[0]["height"].as_f64().unwrap() > 0.0);
    assert_eq!(out["leaves"], serde_json::json!([0, 1]));
    assert_eq!(out["tree"]["kind"], "cluster");
    assert_eq!(out["linkage"], "average");
    assert_eq!(out["orientation"], "bottom");
}

#[test]
fn ops_cluster_raw_counts_and_groups() {
    let (_dir, path) = small_state();
    let request = ClusterRequest {
        options: ClusterOptions {
            linkage: Linkage::Ward,
            ..Default::default()
        },
        smoothed: false,
        groups: Some(2),
        color_threshold: Some(0.0),
        keys: None,
    };
    let out = ops::op_cluster(&path, &request).unwrap();
    // raw rows (3,1,0) and (0,1,2)
    let height = out["merges"][0]["height"].as_f64().unwrap();
    assert!((height - 13f64.sqrt()).abs() < 1e-9);
    assert_eq!(out["groups"], serde_json::json!([0, 1]));
    assert_eq!(out["threshold_groups"], serde_json::json!([0, 1]));
}

#[test]
fn ops_cluster_attaches_keywords() {
    let (dir, path) = small_state();
    let keys = dir.path().join("keys2.txt");
    fs::write(&keys, "0\t0.5\tapple banana\n1\t0.5\tcherry date\n").unwrap();
    let request = ClusterRequest {
        keys: Some(keys.to_string_lossy().into_owned()),
        ..Default::default()
    };
    let out = ops::op_cluster(&path, &request).unwrap();
    assert_eq!(out["keywords"]["Topic1"], "apple banana");
    assert_eq!(out["keywords"]["Topic2"], "cherry date");
}

#[test]
fn ops_single_topic_cannot_be_clustered() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        &dir,
        "one.gz",
        "#doc source pos typeindex type topic\n#alpha : 1.0\n#beta : 0.1\n0 NA 0 0 a 0\n",
    );
    let err = ops::op_cluster(&path, &ClusterRequest::default()).unwrap_err();
    assert!(matches!(err, Error::Clustering(_)), "got {err}");
}

#[test]
fn ops_zero_beta_with_unused_topic_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        &dir,
        "unused.gz",
        "#doc source pos typeindex type topic\n#alpha : 0.5 0.5 0.5\n#beta : 0\n\
         0 NA 0 0 a 0\n1 NA 0 1 b 1\n",
    );
    let err = ops::op_distributions(&path).unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err}");
}

#[test]
fn ops_malformed_row_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        &dir,
        "bad.gz",
        "#doc source pos typeindex type topic\n#alpha : 0.5 0.5\n#beta : 0.1\n\
         0 NA 0 0 a 0\n0 NA 1 1 b seven\n",
    );
    match ops::op_state_info(&path).unwrap_err() {
        Error::StateFormat(e) => assert_eq!(e.line, Some(5)),
        other => panic!("expected a state format error, got {other}"),
    }
}

#[test]
fn ops_missing_file_is_an_error() {
    assert!(ops::op_state_info("/nonexistent/topic-state.gz").is_err());
}

fn model_dir(root: &Path, topics: usize) -> PathBuf {
    let dir = root.join(format!("topics{topics}"));
    fs::create_dir(&dir).unwrap();
    dir
}

#[test]
fn ops_scale_models_isolates_failures() {
    let root = tempfile::tempdir().unwrap();
    let good = model_dir(root.path(), 2);
    write_gz(&good.join("topic-state2.gz"), SMALL_STATE);
    let bad = model_dir(root.path(), 10);
    fs::write(bad.join("topic-state10.gz"), b"not gzip at all").unwrap();

    let summary =
        ops::op_scale_models(root.path().to_str().unwrap(), ScaleOptions::default()).unwrap();
    assert_eq!(summary["failed"], 1);
    let models = summary["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["name"], "topics2");
    assert_eq!(models[0]["status"], "ok");
    assert_eq!(models[1]["name"], "topics10");
    assert_eq!(models[1]["status"], "error");

    let csv = fs::read_to_string(good.join("topic_scaled.csv")).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(!bad.join("topic_scaled.csv").exists());
}

#[test]
fn ops_cluster_models_runs_every_setting_and_isolates_failures() {
    let root = tempfile::tempdir().unwrap();
    let good = model_dir(root.path(), 2);
    write_gz(&good.join("topic-state2.gz"), SMALL_STATE);
    fs::write(good.join("keys2.txt"), "0\t0.5\tapple\n1\t0.5\tcherry\n").unwrap();
    let bad = model_dir(root.path(), 3);
    fs::write(bad.join("topic-state3.gz"), b"not gzip at all").unwrap();

    let summary = ops::op_cluster_models(
        root.path().to_str().unwrap(),
        &[Metric::Euclidean, Metric::Cosine],
        &[Linkage::Average, Linkage::Ward],
        &ClusterRequest {
            groups: Some(2),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(summary["settings"].as_array().unwrap().len(), 4);
    let results = summary["results"].as_array().unwrap();
    assert_eq!(results.len(), 8);
    assert_eq!(summary["failed"], 4);

    let ok: Vec<&Value> = results.iter().filter(|r| r["status"] == "ok").collect();
    assert_eq!(ok.len(), 4);
    assert!(ok.iter().all(|r| r["name"] == "topics2"));
    assert!(ok.iter().all(|r| r["merges"].as_array().unwrap().len() == 1));
    assert!(ok.iter().all(|r| r["groups"] == serde_json::json!([0, 1])));
    assert_eq!(ok[0]["keywords"]["Topic2"], "cherry");
    assert_eq!(ok[3]["metric"], "cosine");
    assert_eq!(ok[3]["linkage"], "ward");

    let failed: Vec<&Value> = results.iter().filter(|r| r["status"] == "error").collect();
    assert!(failed.iter().all(|r| r["name"] == "topics3"));
}

#[test]
fn ops_cluster_models_defaults_to_request_options() {
    let root = tempfile::tempdir().unwrap();
    let good = model_dir(root.path(), 2);
    write_gz(&good.join("topic-state2.gz"), SMALL_STATE);

    let request = ClusterRequest {
        options: ClusterOptions {
            linkage: Linkage::Complete,
            ..Default::default()
        },
        ..Default::default()
    };
    let summary =
        ops::op_cluster_models(root.path().to_str().unwrap(), &[], &[], &request).unwrap();
    assert_eq!(
        summary["settings"],
        serde_json::json!([{"metric": "euclidean", "linkage": "complete"}])
    );
    assert_eq!(summary["failed"], 0);
}
