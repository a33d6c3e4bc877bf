mod builder;
mod event;
mod step;

use scholar_model::{
    ModelMessage, ModelProviderError, ModelRequest, ModelTool, ToolCallResult,
};
use tracing::Instrument;

use crate::conversation::{ConversationMemory, MemoryPolicy, Role};
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::tool::Toolbox;
pub use builder::AgentBuilder;
pub use event::{EventSink, TurnError, TurnEvent};
use step::{SKIPPED_OBSERVATION, Step};
pub use step::{CORRECTION_PROMPT, INVALID_RESPONSE};

/// The iteration cap used unless the builder sets another one.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// The answer given when the iteration cap is hit under
/// [`EarlyStopping::Force`].
pub const FORCED_ANSWER: &str =
    "Agent stopped due to iteration limit or time limit.";

const FINAL_ANSWER_PROMPT: &str = "You have used up your tool calls. Using \
    only the observations above, give your best final answer to my \
    question.";

/// What to answer when the iteration cap is hit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EarlyStopping {
    /// Answer with [`FORCED_ANSWER`].
    #[default]
    Force,
    /// Ask the model once more, without tools, for a best-effort answer.
    Generate,
}

/// An agent that answers one user utterance at a time, looking things up
/// with its tools along the way.
///
/// The agent holds no conversation state of its own. Each turn receives the
/// memory to reason with, and everything that happens inside the turn is
/// discarded once the answer is returned.
#[derive(Clone)]
pub struct Agent {
    model_client: ModelClient,
    toolbox: Toolbox,
    system_prompt: Option<String>,
    max_iterations: usize,
    early_stopping: EarlyStopping,
    memory_policy: MemoryPolicy,
}

impl Agent {
    /// Returns the tools of this agent.
    #[inline]
    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// Returns the iteration cap of a turn.
    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Runs one turn and returns the final answer.
    ///
    /// Tool failures and unusable model responses are absorbed by the loop.
    /// Only a failed model request ends the turn with an error.
    pub async fn run_turn(
        &self,
        input: &str,
        memory: &ConversationMemory,
        events: &EventSink,
    ) -> Result<String, TurnError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let span = info_span!("turn", memory_turns = memory.turns());
        self.run_loop(input, memory, events).instrument(span).await
    }

    async fn run_loop(
        &self,
        input: &str,
        memory: &ConversationMemory,
        events: &EventSink,
    ) -> Result<String, TurnError> {
        let mut trace = self.initial_messages(input, memory);
        let tools = self.toolbox.definitions();

        for iteration in 1..=self.max_iterations {
            debug!("iteration {iteration}");
            events.emit(TurnEvent::Thinking { iteration });
            let resp = self.think(trace.clone(), tools.clone(), events).await?;

            match step::interpret(resp, &self.toolbox, &mut trace) {
                Step::Finish(answer) => {
                    info!("finished after {iteration} iterations");
                    return Ok(answer);
                }
                Step::Act {
                    call_id,
                    tool,
                    query,
                    skipped,
                } => {
                    events.emit(TurnEvent::Action {
                        tool,
                        query: query.clone(),
                    });
                    let observation = self.toolbox.invoke(tool, &query).await;
                    trace.push(tool_result(call_id, observation.text()));
                    events.emit(TurnEvent::Observation { tool, observation });
                    answer_skipped(&mut trace, skipped);
                }
                Step::Reject {
                    call_id,
                    reason,
                    skipped,
                } => {
                    warn!("rejected tool call: {reason}");
                    trace.push(tool_result(call_id, &reason));
                    events.emit(TurnEvent::Correction { reason });
                    answer_skipped(&mut trace, skipped);
                }
                Step::Reprompt { reason } => {
                    warn!("unusable response: {reason}");
                    events.emit(TurnEvent::Correction { reason });
                }
            }
        }

        self.stop_early(trace, events).await
    }

    async fn stop_early(
        &self,
        mut trace: Vec<ModelMessage>,
        events: &EventSink,
    ) -> Result<String, TurnError> {
        warn!("iteration limit of {} reached", self.max_iterations);
        events.emit(TurnEvent::IterationLimit {
            iterations: self.max_iterations,
        });
        match self.early_stopping {
            EarlyStopping::Force => Ok(FORCED_ANSWER.to_owned()),
            EarlyStopping::Generate => {
                trace.push(ModelMessage::User(FINAL_ANSWER_PROMPT.to_owned()));
                events.emit(TurnEvent::Thinking {
                    iteration: self.max_iterations + 1,
                });
                let resp = self.think(trace, vec![], events).await?;
                let answer = resp.transcript.trim();
                if answer.is_empty() {
                    Ok(FORCED_ANSWER.to_owned())
                } else {
                    Ok(answer.to_owned())
                }
            }
        }
    }

    async fn think(
        &self,
        messages: Vec<ModelMessage>,
        tools: Vec<ModelTool>,
        events: &EventSink,
    ) -> Result<ModelClientResponse, TurnError> {
        let sink = events.clone();
        self.model_client
            .send_request(ModelRequest { messages, tools }, move |delta| {
                sink.emit(TurnEvent::Token(delta));
            })
            .await
            .map_err(|err| model_error(&*err))
    }

    fn initial_messages(
        &self,
        input: &str,
        memory: &ConversationMemory,
    ) -> Vec<ModelMessage> {
        let window = memory.window(self.memory_policy);
        let mut messages = Vec::with_capacity(window.len() + 2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ModelMessage::System(system_prompt.clone()));
        }
        messages.extend(window.iter().map(|msg| match msg.role() {
            Role::User => ModelMessage::User(msg.content().to_owned()),
            Role::Assistant => ModelMessage::Assistant(msg.content().to_owned()),
        }));
        messages.push(ModelMessage::User(input.to_owned()));
        messages
    }
}

fn tool_result(id: String, content: &str) -> ModelMessage {
    ModelMessage::Tool(ToolCallResult {
        id,
        content: content.to_owned(),
    })
}

fn answer_skipped(trace: &mut Vec<ModelMessage>, skipped: Vec<String>) {
    for id in skipped {
        trace.push(tool_result(id, SKIPPED_OBSERVATION));
    }
}

fn model_error(err: &dyn ModelProviderError) -> TurnError {
    error!("model request failed: {err}");
    TurnError::Model {
        kind: err.kind(),
        message: err.to_string(),
    }
}
