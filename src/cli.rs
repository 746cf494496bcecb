use clap::{Parser, Subcommand};
use nu_plugin_topicstate::algo::clustering::{ClusterOptions, Linkage, Metric, Orientation};
use nu_plugin_topicstate::algo::scaling::{Reducer, ScaleOptions};
use nu_plugin_topicstate::error::Error;
use nu_plugin_topicstate::ops;
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "topicstate",
    version,
    about = "Topic distributions, coordinates and dendrograms from MALLET topic-state files"
)]
struct Cli {
    /// Start as an MCP (Model Context Protocol) server on stdio.
    /// AI assistants (Claude Desktop, Cursor, etc.) connect via JSON-RPC.
    #[cfg(feature = "mcp")]
    #[arg(long, exclusive = true)]
    mcp: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Hyperparameters and corpus counts of a state file
    Info {
        /// Path to a gzip-compressed MALLET state file
        state: String,
    },
    /// Smoothed topic-term and document-topic distributions
    Dists {
        state: String,
    },
    /// Two-dimensional topic coordinates with corpus shares
    Scale {
        state: String,
        /// Reducer: pcoa, mmds, tsne
        #[arg(short, long, default_value = "pcoa")]
        reducer: String,
        /// Keep model topic order instead of sorting by share
        #[arg(long)]
        no_sort: bool,
        /// Also write topic_scaled CSV rows to this path
        #[arg(long)]
        csv: Option<String>,
    },
    /// Hierarchical clustering of topics into a dendrogram
    Cluster {
        state: String,
        /// Metric: euclidean, cosine
        #[arg(short, long, default_value = "euclidean")]
        metric: String,
        /// Linkage: single, complete, average, ward
        #[arg(short, long, default_value = "average")]
        linkage: String,
        /// Cluster raw topic-term counts instead of smoothed distributions
        #[arg(long)]
        raw: bool,
        /// Orientation: top, bottom, left, right
        #[arg(short, long, default_value = "bottom")]
        orientation: String,
        /// Report flat groups formed below this height
        #[arg(long)]
        color_threshold: Option<f64>,
        /// Report this many flat groups
        #[arg(short, long)]
        groups: Option<usize>,
        /// MALLET keys file to attach as topic keywords
        #[arg(short, long)]
        keys: Option<String>,
    },
    /// Write topic_scaled.csv for every topics{N} model under a directory
    Batch {
        model_dir: String,
        /// Reducer: pcoa, mmds, tsne
        #[arg(short, long, default_value = "pcoa")]
        reducer: String,
        #[arg(long)]
        no_sort: bool,
    },
    /// Cluster every topics{N} model under a directory with each metric and linkage
    BatchCluster {
        model_dir: String,
        /// Metric to run; repeat for several (default: euclidean)
        #[arg(short, long = "metric")]
        metrics: Vec<String>,
        /// Linkage to run; repeat for several (default: average)
        #[arg(short, long = "linkage")]
        linkages: Vec<String>,
        /// Cluster raw topic-term counts instead of smoothed distributions
        #[arg(long)]
        raw: bool,
        /// Orientation: top, bottom, left, right
        #[arg(short, long, default_value = "bottom")]
        orientation: String,
        /// Report flat groups formed below this height
        #[arg(long)]
        color_threshold: Option<f64>,
        /// Report this many flat groups
        #[arg(short, long)]
        groups: Option<usize>,
    },
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    // ── MCP server mode ─────────────────────────────────────────────────
    #[cfg(feature = "mcp")]
    if cli.mcp {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("failed to create tokio runtime: {e}");
                std::process::exit(1);
            }
        };
        rt.block_on(async {
            if let Err(e) = nu_plugin_topicstate::mcp::serve_stdio().await {
                eprintln!("MCP server error: {e}");
                std::process::exit(1);
            }
        });
        return;
    }

    // ── Normal subcommand dispatch ──────────────────────────────────────
    let Some(command) = cli.command else {
        eprintln!("No subcommand provided. Run `topicstate --help` for usage.");
        std::process::exit(1);
    };

    match run(command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Print the command's JSON output and return the process exit code.
fn run(command: Commands) -> Result<i32, Error> {
    let output = match command {
        Commands::Info { state } => ops::op_state_info(&state)?,
        Commands::Dists { state } => ops::op_distributions(&state)?,
        Commands::Scale {
            state,
            reducer,
            no_sort,
            csv,
        } => ops::op_scale(&state, scale_options(&reducer, no_sort)?, csv.as_deref())?,
        Commands::Cluster {
            state,
            metric,
            linkage,
            raw,
            orientation,
            color_threshold,
            groups,
            keys,
        } => {
            let request = ops::ClusterRequest {
                options: ClusterOptions {
                    metric: metric.parse::<Metric>()?,
                    linkage: linkage.parse::<Linkage>()?,
                    orientation: orientation.parse::<Orientation>()?,
                },
                smoothed: !raw,
                color_threshold,
                groups,
                keys,
            };
            ops::op_cluster(&state, &request)?
        }
        Commands::Batch {
            model_dir,
            reducer,
            no_sort,
        } => {
            let summary = ops::op_scale_models(&model_dir, scale_options(&reducer, no_sort)?)?;
            print_json(&summary)?;
            return Ok(exit_code(&summary));
        }
        Commands::BatchCluster {
            model_dir,
            metrics,
            linkages,
            raw,
            orientation,
            color_threshold,
            groups,
        } => {
            let metrics = metrics
                .iter()
                .map(|m| m.parse::<Metric>())
                .collect::<Result<Vec<_>, _>>()?;
            let linkages = linkages
                .iter()
                .map(|l| l.parse::<Linkage>())
                .collect::<Result<Vec<_>, _>>()?;
            let request = ops::ClusterRequest {
                options: ClusterOptions {
                    orientation: orientation.parse::<Orientation>()?,
                    ..Default::default()
                },
                smoothed: !raw,
                color_threshold,
                groups,
                keys: None,
            };
            let summary = ops::op_cluster_models(&model_dir, &metrics, &linkages, &request)?;
            print_json(&summary)?;
            return Ok(exit_code(&summary));
        }
    };
    print_json(&output)?;
    Ok(0)
}

fn scale_options(reducer: &str, no_sort: bool) -> Result<ScaleOptions, Error> {
    Ok(ScaleOptions {
        reducer: reducer.parse::<Reducer>()?,
        sort_topics: !no_sort,
    })
}

/// 1 when a batch summary reports any failure.
fn exit_code(summary: &Value) -> i32 {
    let failed = summary.get("failed").and_then(Value::as_u64).unwrap_or(0);
    if failed > 0 {
        1
    } else {
        0
    }
}

fn print_json(value: &Value) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
