use nu_plugin::{EngineInterface, EvaluatedCall, PluginCommand};
use nu_protocol::{Category, Example, LabeledError, PipelineData, Signature, SyntaxShape, Type};

use super::util::{json_to_value, labeled};
use crate::algo::clustering::{ClusterOptions, Linkage, Metric, Orientation};
use crate::error::Error;
use crate::ops::{self, ClusterRequest};
use crate::TopicStatePlugin;

pub struct Cluster;

impl PluginCommand for Cluster {
    type Plugin = TopicStatePlugin;

    fn name(&self) -> &str {
        "topic-state cluster"
    }

    fn description(&self) -> &str {
        "Hierarchically cluster topics into a dendrogram"
    }

    fn signature(&self) -> Signature {
        Signature::build(self.name())
            .input_output_type(Type::Nothing, Type::record())
            .required(
                "state",
                SyntaxShape::Filepath,
                "Gzip-compressed MALLET state file",
            )
            .named(
                "metric",
                SyntaxShape::String,
                "Distance: euclidean, cosine (default: euclidean)",
                Some('m'),
            )
            .named(
                "linkage",
                SyntaxShape::String,
                "Linkage: single, complete, average, ward (default: average)",
                Some('l'),
            )
            .named(
                "orientation",
                SyntaxShape::String,
                "Root side: top, bottom, left, right (default: bottom)",
                Some('o'),
            )
            .switch(
                "raw",
                "Cluster raw topic-term counts instead of smoothed distributions",
                None,
            )
            .named(
                "color-threshold",
                SyntaxShape::Number,
                "Report flat groups formed below this merge height",
                None,
            )
            .named(
                "groups",
                SyntaxShape::Int,
                "Report this many flat groups",
                Some('g'),
            )
            .named(
                "keys",
                SyntaxShape::Filepath,
                "MALLET keys file to attach as topic keywords",
                Some('k'),
            )
            .category(Category::Experimental)
    }

    fn search_terms(&self) -> Vec<&str> {
        vec!["dendrogram", "hac", "hierarchical", "linkage", "tree"]
    }

    fn examples(&self) -> Vec<Example<'_>> {
        vec![
            Example {
                example: "topic-state cluster topic-state.gz | get ordered_labels",
                description: "Topic labels in dendrogram leaf order",
                result: None,
            },
            Example {
                example: "topic-state cluster topic-state.gz --linkage ward --groups 4 --keys keys20.txt",
                description: "Ward clustering cut into four groups, with topic keywords",
                result: None,
            },
        ]
    }

    fn run(
        &self,
        _plugin: &TopicStatePlugin,
        _engine: &EngineInterface,
        call: &EvaluatedCall,
        _input: PipelineData,
    ) -> Result<PipelineData, LabeledError> {
        let state: String = call.req(0)?;
        let metric: Option<String> = call.get_flag("metric")?;
        let linkage: Option<String> = call.get_flag("linkage")?;
        let orientation: Option<String> = call.get_flag("orientation")?;
        let raw = call.has_flag("raw")?;
        let color_threshold: Option<f64> = call.get_flag("color-threshold")?;
        let groups: Option<i64> = call.get_flag("groups")?;
        let keys: Option<String> = call.get_flag("keys")?;
        let head = call.head;

        let options = parse_options(
            metric.as_deref(),
            linkage.as_deref(),
            orientation.as_deref(),
        )
        .map_err(|e| labeled(e, head))?;
        let request = ClusterRequest {
            options,
            smoothed: !raw,
            color_threshold,
            groups: groups.map(|g| g.max(1) as usize),
            keys,
        };
        let output = ops::op_cluster(&state, &request).map_err(|e| labeled(e, head))?;
        Ok(PipelineData::Value(json_to_value(&output, head), None))
    }
}

fn parse_options(
    metric: Option<&str>,
    linkage: Option<&str>,
    orientation: Option<&str>,
) -> Result<ClusterOptions, Error> {
    let defaults = ClusterOptions::default();
    Ok(ClusterOptions {
        metric: metric.map(str::parse::<Metric>).transpose()?.unwrap_or(defaults.metric),
        linkage: linkage
            .map(str::parse::<Linkage>)
            .transpose()?
            .unwrap_or(defaults.linkage),
        orientation: orientation
            .map(str::parse::<Orientation>)
            .transpose()?
            .unwrap_or(defaults.orientation),
    })
}
