use nu_plugin::{EngineInterface, EvaluatedCall, PluginCommand};
use nu_protocol::{Category, Example, LabeledError, PipelineData, Signature, SyntaxShape, Type};

use super::util::{json_to_value, labeled};
use crate::algo::scaling::{Reducer, ScaleOptions};
use crate::ops;
use crate::TopicStatePlugin;

pub struct Scale;

impl PluginCommand for Scale {
    type Plugin = TopicStatePlugin;

    fn name(&self) -> &str {
        "topic-state scale"
    }

    fn description(&self) -> &str {
        "Lay topics out in 2D by the Jensen-Shannon divergence of their term distributions"
    }

    fn signature(&self) -> Signature {
        Signature::build(self.name())
            .input_output_type(Type::Nothing, Type::table())
            .required(
                "state",
                SyntaxShape::Filepath,
                "Gzip-compressed MALLET state file",
            )
            .named(
                "reducer",
                SyntaxShape::String,
                "Reducer: pcoa, mmds, tsne (default: pcoa)",
                Some('r'),
            )
            .switch(
                "no-sort",
                "Keep model topic order instead of sorting by corpus share",
                None,
            )
            .named(
                "csv",
                SyntaxShape::Filepath,
                "Also write headerless topic_scaled CSV rows to this path",
                None,
            )
            .category(Category::Experimental)
    }

    fn search_terms(&self) -> Vec<&str> {
        vec!["pcoa", "mds", "tsne", "scatter", "coordinates", "ldavis"]
    }

    fn examples(&self) -> Vec<Example<'_>> {
        vec![
            Example {
                example: "topic-state scale topic-state.gz",
                description: "Principal-coordinate layout, largest topics first",
                result: None,
            },
            Example {
                example: "topic-state scale topic-state.gz --reducer tsne --no-sort",
                description: "t-SNE layout in model topic order",
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
        let reducer: String = call
            .get_flag::<String>("reducer")?
            .unwrap_or_else(|| "pcoa".into());
        let no_sort = call.has_flag("no-sort")?;
        let csv: Option<String> = call.get_flag("csv")?;
        let head = call.head;

        let options = ScaleOptions {
            reducer: reducer.parse::<Reducer>().map_err(|e| labeled(e, head))?,
            sort_topics: !no_sort,
        };
        let output =
            ops::op_scale(&state, options, csv.as_deref()).map_err(|e| labeled(e, head))?;
        Ok(PipelineData::Value(json_to_value(&output, head), None))
    }
}
