//! Interpretation of a single model response.

use scholar_model::{ModelFinishReason, ModelMessage};

use crate::model_client::ModelClientResponse;
use crate::tool::{ToolKind, Toolbox, parse_query};

/// Prefix of every notice about a response that could not be used.
pub const INVALID_RESPONSE: &str = "Invalid or incomplete response";

/// Sent to the model after a response with neither an answer nor a call.
pub const CORRECTION_PROMPT: &str = "Invalid or incomplete response. Reply \
    with a final answer, or call exactly one of the available tools.";

/// Observation for every tool call beyond the first one in a response.
pub const SKIPPED_OBSERVATION: &str =
    "Skipped: only one tool call is executed per step.";

/// What the agent does after a model response.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The response is the final answer.
    Finish(String),
    /// Run the tool, then think again.
    Act {
        call_id: String,
        tool: ToolKind,
        query: String,
        skipped: Vec<String>,
    },
    /// The tool call can't be run. `reason` is handed back as its result.
    Reject {
        call_id: String,
        reason: String,
        skipped: Vec<String>,
    },
    /// Neither an answer nor a call. The correction is already in the trace.
    Reprompt { reason: String },
}

/// Interprets `resp`, appending what has to be replayed to `trace`.
///
/// Tool results are not appended here, the caller does that once the
/// outcome of the step is known.
pub(crate) fn interpret(
    resp: ModelClientResponse,
    toolbox: &Toolbox,
    trace: &mut Vec<ModelMessage>,
) -> Step {
    let ModelClientResponse {
        transcript,
        opaque_msg,
        tool_calls,
        finish_reason,
    } = resp;

    let mut calls = tool_calls.into_iter();
    let Some(first) = calls.next() else {
        let text = transcript.trim();
        let wants_tool = finish_reason == Some(ModelFinishReason::ToolCalls);
        if !text.is_empty() && !wants_tool {
            return Step::Finish(text.to_owned());
        }
        if !text.is_empty() {
            trace.push(ModelMessage::Assistant(text.to_owned()));
        }
        trace.push(ModelMessage::User(CORRECTION_PROMPT.to_owned()));
        let reason = if wants_tool {
            "a tool call was announced but never made"
        } else {
            "the response was empty"
        };
        return Step::Reprompt {
            reason: format!("{INVALID_RESPONSE}: {reason}"),
        };
    };

    // Replay the provider's own message, it carries the call ids.
    trace.push(match opaque_msg {
        Some(opaque_msg) => ModelMessage::Opaque(opaque_msg),
        None => ModelMessage::Assistant(transcript),
    });
    let skipped: Vec<_> = calls.map(|call| call.id).collect();
    if !skipped.is_empty() {
        debug!("skipping {} extra tool calls", skipped.len());
    }

    let Some(tool) = toolbox.resolve(&first.name) else {
        return Step::Reject {
            call_id: first.id,
            reason: toolbox.invalid_tool_message(&first.name),
            skipped,
        };
    };
    match parse_query(first.arguments) {
        Ok(query) => Step::Act {
            call_id: first.id,
            tool,
            query,
            skipped,
        },
        Err(why) => Step::Reject {
            call_id: first.id,
            reason: format!("{INVALID_RESPONSE}: {why}"),
            skipped,
        },
    }
}

#[cfg(test)]
mod tests {
    use scholar_model::{OpaqueMessage, ToolCallRequest};
    use serde_json::json;

    use super::*;
    use crate::tool::{LookupResult, Tool};

    struct NoopTool(ToolKind);

    impl Tool for NoopTool {
        fn kind(&self) -> ToolKind {
            self.0
        }

        fn lookup(
            &self,
            _query: String,
            _max_results: usize,
        ) -> impl Future<Output = LookupResult> + Send + 'static {
            std::future::ready(Ok(vec![]))
        }
    }

    fn toolbox() -> Toolbox {
        let mut toolbox = Toolbox::default();
        for kind in ToolKind::ALL {
            toolbox.register(NoopTool(kind));
        }
        toolbox
    }

    fn response(
        transcript: &str,
        tool_calls: Vec<ToolCallRequest>,
        finish_reason: ModelFinishReason,
    ) -> ModelClientResponse {
        ModelClientResponse {
            transcript: transcript.to_owned(),
            opaque_msg: Some(OpaqueMessage::new("resp", transcript.to_owned())),
            tool_calls,
            finish_reason: Some(finish_reason),
        }
    }

    fn call(id: &str, name: &str, query: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments: json!({ "query": query }),
        }
    }

    #[test]
    fn test_final_answer() {
        let mut trace = vec![];
        let step = interpret(
            response("  It is 42.\n", vec![], ModelFinishReason::Stop),
            &toolbox(),
            &mut trace,
        );
        assert_eq!(step, Step::Finish("It is 42.".to_owned()));
        assert!(trace.is_empty());
    }

    #[test]
    fn test_first_call_wins() {
        let mut trace = vec![];
        let step = interpret(
            response(
                "",
                vec![
                    call("call_1", "arxiv", "graphene"),
                    call("call_2", "wikipedia", "graphene"),
                ],
                ModelFinishReason::ToolCalls,
            ),
            &toolbox(),
            &mut trace,
        );
        assert_eq!(
            step,
            Step::Act {
                call_id: "call_1".to_owned(),
                tool: ToolKind::Arxiv,
                query: "graphene".to_owned(),
                skipped: vec!["call_2".to_owned()],
            }
        );
        assert!(matches!(trace.as_slice(), [ModelMessage::Opaque(_)]));
    }

    #[test]
    fn test_unknown_tool_and_bad_arguments() {
        let mut trace = vec![];
        let step = interpret(
            response(
                "",
                vec![call("call_1", "calculator", "2+2")],
                ModelFinishReason::ToolCalls,
            ),
            &toolbox(),
            &mut trace,
        );
        let Step::Reject { reason, .. } = step else {
            panic!("expected a rejected call, got {step:?}");
        };
        assert!(reason.starts_with("calculator is not a valid tool"));

        let bad_call = ToolCallRequest {
            id: "call_2".to_owned(),
            name: "wikipedia".to_owned(),
            arguments: json!({ "topic": "rust" }),
        };
        let step = interpret(
            response("", vec![bad_call], ModelFinishReason::ToolCalls),
            &toolbox(),
            &mut trace,
        );
        let Step::Reject { reason, .. } = step else {
            panic!("expected a rejected call, got {step:?}");
        };
        assert!(reason.starts_with(INVALID_RESPONSE));
    }

    #[test]
    fn test_unusable_responses_reprompt() {
        let mut trace = vec![];
        let step = interpret(
            response(" \n", vec![], ModelFinishReason::Stop),
            &toolbox(),
            &mut trace,
        );
        assert!(matches!(step, Step::Reprompt { .. }));
        assert_eq!(trace, [ModelMessage::User(CORRECTION_PROMPT.to_owned())]);

        let mut trace = vec![];
        let step = interpret(
            response("Let me search.", vec![], ModelFinishReason::ToolCalls),
            &toolbox(),
            &mut trace,
        );
        assert!(matches!(step, Step::Reprompt { .. }));
        assert_eq!(
            trace,
            [
                ModelMessage::Assistant("Let me search.".to_owned()),
                ModelMessage::User(CORRECTION_PROMPT.to_owned()),
            ]
        );
    }
}
