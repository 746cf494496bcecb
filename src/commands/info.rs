use nu_plugin::{EngineInterface, EvaluatedCall, PluginCommand};
use nu_protocol::{Category, Example, LabeledError, PipelineData, Signature, SyntaxShape, Type};

use super::util::{json_to_value, labeled};
use crate::ops;
use crate::TopicStatePlugin;

pub struct Info;

impl PluginCommand for Info {
    type Plugin = TopicStatePlugin;

    fn name(&self) -> &str {
        "topic-state info"
    }

    fn description(&self) -> &str {
        "Show hyperparameters and corpus counts of a MALLET topic-state file"
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
        vec!["mallet", "lda", "alpha", "beta", "hyperparameters"]
    }

    fn examples(&self) -> Vec<Example<'_>> {
        vec![Example {
            example: "topic-state info topics20/topic-state20.gz",
            description: "Number of topics, documents and terms in a 20-topic model",
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
        let output = ops::op_state_info(&state).map_err(|e| labeled(e, head))?;
        Ok(PipelineData::Value(json_to_value(&output, head), None))
    }
}
