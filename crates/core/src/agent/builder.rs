use std::time::Duration;

use scholar_model::ModelProvider;

use super::{Agent, DEFAULT_MAX_ITERATIONS, EarlyStopping};
use crate::conversation::MemoryPolicy;
use crate::model_client::ModelClient;
use crate::tool::{Tool, Toolbox};

/// [`Agent`] builder.
#[derive(Clone)]
pub struct AgentBuilder {
    model_client: ModelClient,
    toolbox: Toolbox,
    system_prompt: Option<String>,
    max_iterations: usize,
    early_stopping: EarlyStopping,
    memory_policy: MemoryPolicy,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            toolbox: Toolbox::default(),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            early_stopping: EarlyStopping::default(),
            memory_policy: MemoryPolicy::default(),
        }
    }

    /// Sets the system prompt sent at the start of every request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool. A tool of the same kind registered earlier is
    /// replaced.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.toolbox.register(tool);
        self
    }

    /// Caps the reasoning iterations of a turn. Values below one are
    /// raised to one.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Sets what to answer when the iteration cap is hit.
    #[inline]
    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    /// Sets how much of the memory the model sees.
    #[inline]
    pub fn with_memory_policy(mut self, memory_policy: MemoryPolicy) -> Self {
        self.memory_policy = memory_policy;
        self
    }

    /// Sets how long rate limited model requests are retried for.
    #[inline]
    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.model_client.set_retry_timeout(timeout);
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            toolbox,
            system_prompt,
            max_iterations,
            early_stopping,
            memory_policy,
        } = self;
        Agent {
            model_client,
            toolbox,
            system_prompt,
            max_iterations,
            early_stopping,
            memory_policy,
        }
    }
}
