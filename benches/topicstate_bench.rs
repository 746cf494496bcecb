use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nu_plugin_topicstate::algo::clustering::{self, ClusterOptions, Linkage};
use nu_plugin_topicstate::algo::distributions::build_distributions;
use nu_plugin_topicstate::algo::divergence::js_distance_matrix;
use nu_plugin_topicstate::algo::rng::LcgRng;
use nu_plugin_topicstate::algo::scaling::{topic_coordinates, Reducer, ScaleOptions};
use nu_plugin_topicstate::algo::state::{Assignment, Hyperparameters, TopicState};

/// Synthetic sampler state: `docs` documents of 50 tokens over a 2000-term vocabulary.
fn generate_state(docs: usize, topics: usize) -> TopicState {
    let mut rng = LcgRng::new(42);
    let assignments = (0..docs)
        .flat_map(|doc| (0..50).map(move |_| doc))
        .map(|doc| {
            let topic = (rng.next_u64() % topics as u64) as usize;
            let term = (rng.next_u64() % 2000) as usize;
            Assignment {
                doc,
                token: format!("term{term}"),
                topic,
            }
        })
        .collect();
    TopicState {
        hyperparameters: Hyperparameters {
            alpha: vec![0.1; topics],
            beta: 0.01,
        },
        assignments,
    }
}

fn bench_build_distributions(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_distributions");
    for docs in [100, 1000] {
        let state = generate_state(docs, 20);
        group.bench_with_input(BenchmarkId::from_parameter(docs), &state, |b, s| {
            b.iter(|| black_box(build_distributions(s)))
        });
    }
    group.finish();
}

fn bench_js_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("js_distance_matrix");
    for topics in [20, 100] {
        let phi = build_distributions(&generate_state(500, topics))
            .map(|d| d.topic_term_dists)
            .unwrap_or_default();
        group.bench_with_input(BenchmarkId::from_parameter(topics), &phi, |b, rows| {
            b.iter(|| black_box(js_distance_matrix(rows)))
        });
    }
    group.finish();
}

fn bench_scaling(c: &mut Criterion) {
    let Ok(data) = build_distributions(&generate_state(500, 50)) else {
        return;
    };
    let mut group = c.benchmark_group("topic_coordinates");
    for reducer in [Reducer::Pcoa, Reducer::Mmds] {
        let options = ScaleOptions {
            reducer,
            sort_topics: true,
        };
        group.bench_function(reducer.name(), |b| {
            b.iter(|| black_box(topic_coordinates(&data, options)))
        });
    }
    group.finish();
}

fn bench_hac(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_topics");
    let phi = build_distributions(&generate_state(500, 100))
        .map(|d| d.topic_term_dists)
        .unwrap_or_default();
    for linkage in [Linkage::Average, Linkage::Ward] {
        let options = ClusterOptions {
            linkage,
            ..Default::default()
        };
        group.bench_function(linkage.name(), |b| {
            b.iter(|| black_box(clustering::cluster_topics(&phi, options)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build_distributions,
    bench_js_matrix,
    bench_scaling,
    bench_hac,
);
criterion_main!(benches);
