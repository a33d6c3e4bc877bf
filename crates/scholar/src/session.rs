use std::time::Duration;

use scholar_core::conversation::{
    ConversationMemory, MemoryPolicy, Message, SessionState,
};
use scholar_core::tool::Tool;
use scholar_core::{
    Agent, AgentBuilder, EarlyStopping, EventSink, TurnError,
};
use scholar_model::ModelProvider;
use tracing::Instrument;
use uuid::Uuid;

use crate::tools::{ArxivTool, WebSearchTool, WikipediaTool};

/// A session builder.
///
/// See [`Session`]. The builder is cheap to clone, which is how a shell
/// creates a fresh session on demand.
#[derive(Clone)]
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider, equipped
    /// with the Wikipedia, arXiv and DuckDuckGo tools.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider)
            .with_tool(WikipediaTool::new())
            .with_tool(ArxivTool::new())
            .with_tool(WebSearchTool::new());
        Self { agent_builder }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Replaces the built-in tool of the same kind.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.agent_builder = self.agent_builder.with_tool(tool);
        self
    }

    /// Caps the reasoning iterations of a turn.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.agent_builder =
            self.agent_builder.with_max_iterations(max_iterations);
        self
    }

    /// Sets what to answer when the iteration cap is hit.
    #[inline]
    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.agent_builder =
            self.agent_builder.with_early_stopping(early_stopping);
        self
    }

    /// Sets how much of the memory the model sees.
    #[inline]
    pub fn with_memory_policy(mut self, memory_policy: MemoryPolicy) -> Self {
        self.agent_builder = self.agent_builder.with_memory_policy(memory_policy);
        self
    }

    /// Sets how long rate limited model requests are retried for.
    #[inline]
    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.agent_builder = self.agent_builder.with_retry_timeout(timeout);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let id = Uuid::new_v4();
        debug!("session {id} created");
        Session {
            id,
            agent: self.agent_builder.build(),
            state: SessionState::new(),
        }
    }
}

/// A chat session: a transcript, the memory behind it, and the agent that
/// answers.
///
/// Only one turn runs at a time, which `send_message` taking `&mut self`
/// enforces. Nothing is persisted, dropping the session ends it.
pub struct Session {
    id: Uuid,
    agent: Agent,
    state: SessionState,
}

impl Session {
    /// Returns the identifier of this session.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the transcript in display order.
    #[inline]
    pub fn transcript(&self) -> &[Message] {
        self.state.transcript()
    }

    /// Returns the conversation memory.
    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        self.state.memory()
    }

    /// Runs one turn and records it, returning the assistant message.
    ///
    /// Progress is reported to `events` while the turn runs. If the turn
    /// fails, the transcript is left untouched.
    pub async fn send_message(
        &mut self,
        input: &str,
        events: &EventSink,
    ) -> Result<&Message, TurnError> {
        let span = info_span!("session", id = %self.id);
        let answer = self
            .agent
            .run_turn(input, self.state.memory(), events)
            .instrument(span)
            .await?;
        Ok(self.state.record_turn(input.trim(), answer)?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            "session {} ended after {} turns",
            self.id,
            self.state.memory().turns()
        );
    }
}
