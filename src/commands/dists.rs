use nu_plugin::{EngineInterface, EvaluatedCall, PluginCommand};
use nu_protocol::{Category, Example, LabeledError, PipelineData, Signature, SyntaxShape, Type};

use super::util::{json_to_value, labeled};
use crate::ops;
use crate::TopicStatePlugin;

pub struct Dists;

impl PluginCommand for Dists {
    type Plugin = TopicStatePlugin;

    fn name(&self) -> &str {
        "topic-state dists"
    }

    fn description(&self) -> &str {
        "Build smoothed topic-term and document-topic distributions from a topic-state file"
    }

    fn extra_description(&self) -> &str {
        "Topic-term rows add beta to every cell; document-topic rows add alpha[t] to topic t. \
         Every row is normalized to sum to 1."
    }

    fn signature(&self) -> Signature {
        Signature::build(self.name())
            .input_output_type(Type::Nothing, Type::record())
            .required(
                "state",
                SyntaxShape::Filepath,
                "Gzip-compressed MALLET state file",
            )
            .category(Category::Experimental)
    }

    fn search_terms(&self) -> Vec<&str> {
        vec!["phi", "theta", "distribution", "matrix", "ldavis"]
    }

    fn examples(&self) -> Vec<Example<'_>> {
        vec![Example {
            example: "topic-state dists topic-state.gz | get vocab | length",
            description: "Vocabulary size of a model",
            result: None,
        }]
    }

    fn run(
        &self,
        _plugin: &TopicStatePlugin,
        _engine: &EngineInterface,
        call: &EvaluatedCall,
        _input: PipelineData,
    ) -> Result<PipelineData, LabeledError> {
        let state: String = call.req(0)?;
        let head = call.head;
        let output = ops::op_distributions(&state).map_err(|e| labeled(e, head))?;
        Ok(PipelineData::Value(json_to_value(&output, head), None))
    }
}
