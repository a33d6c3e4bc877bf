//! Command line and environment configuration.

use std::fmt::{self, Debug};

use clap::Parser;
use scholar_core::conversation::MemoryPolicy;
use scholar_core::{DEFAULT_MAX_ITERATIONS, EarlyStopping};
use scholar_openai_model::{GROQ_BASE_URL, OpenAIConfig, OpenAIConfigBuilder};

use crate::SessionBuilder;

/// Models that can be selected, in index order. The first one is the
/// default.
pub const MODEL_ALLOWLIST: [&str; 4] = [
    "llama3-8b-8192",
    "llama-3.1-8b-instant",
    "llama-3.3-70b-versatile",
    "gemma2-9b-it",
];

/// Index of the model used when none is selected.
pub const DEFAULT_MODEL_INDEX: usize = 0;

/// Chat with an assistant that can search Wikipedia, arXiv and the web.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "scholar", version)]
pub struct Args {
    /// API key of the model provider.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model to chat with, one of `--list-models`.
    #[arg(long, env = "SCHOLAR_MODEL", conflicts_with = "model_index")]
    pub model: Option<String>,

    /// Index of the model to chat with, see `--list-models`.
    #[arg(long)]
    pub model_index: Option<usize>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "GROQ_BASE_URL")]
    pub base_url: Option<String>,

    /// Maximum number of reasoning iterations per turn.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Only show the model the most recent N turns.
    #[arg(long, value_name = "N")]
    pub memory_turns: Option<usize>,

    /// Ask the model for a best-effort answer when the iteration limit is
    /// hit, instead of giving up.
    #[arg(long)]
    pub generate_on_limit: bool,

    /// Print the selectable models and exit.
    #[arg(long)]
    pub list_models: bool,
}

/// Errors that stop the program before the first prompt.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No API key was given.
    #[error("GROQ_API_KEY is not set, pass --api-key or set the variable")]
    MissingApiKey,
    /// The model is not in [`MODEL_ALLOWLIST`].
    #[error("unknown model `{0}`, run with --list-models to see the choices")]
    UnknownModel(String),
    /// The model index is past the end of [`MODEL_ALLOWLIST`].
    #[error("model index {index} is out of range, there are {len} models")]
    ModelIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of selectable models.
        len: usize,
    },
    /// Both a model and a model index were given.
    #[error("--model and --model-index cannot be used together")]
    ConflictingModelChoice,
    /// The iteration cap is zero.
    #[error("--max-iterations must be at least 1")]
    InvalidMaxIterations,
}

/// Resolves the model to chat with.
pub fn select_model(
    model: Option<&str>,
    index: Option<usize>,
) -> Result<&'static str, ConfigError> {
    match (model, index) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingModelChoice),
        (Some(model), None) => MODEL_ALLOWLIST
            .into_iter()
            .find(|allowed| *allowed == model.trim())
            .ok_or_else(|| ConfigError::UnknownModel(model.to_owned())),
        (None, Some(index)) => MODEL_ALLOWLIST.get(index).copied().ok_or(
            ConfigError::ModelIndexOutOfRange {
                index,
                len: MODEL_ALLOWLIST.len(),
            },
        ),
        (None, None) => Ok(MODEL_ALLOWLIST[DEFAULT_MODEL_INDEX]),
    }
}

/// The validated settings of a run.
#[derive(Clone)]
pub struct Settings {
    api_key: String,
    /// The model to chat with.
    pub model: &'static str,
    /// Base URL of the model endpoint.
    pub base_url: String,
    /// Iteration cap of a turn.
    pub max_iterations: usize,
    /// How much memory the model sees.
    pub memory_policy: MemoryPolicy,
    /// What to answer when the iteration cap is hit.
    pub early_stopping: EarlyStopping,
}

impl Settings {
    /// Validates parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let api_key = args
            .api_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let model = select_model(args.model.as_deref(), args.model_index)?;
        let max_iterations = args.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations);
        }
        Ok(Self {
            api_key,
            model,
            base_url: args.base_url.unwrap_or_else(|| GROQ_BASE_URL.to_owned()),
            max_iterations,
            memory_policy: args
                .memory_turns
                .map_or(MemoryPolicy::Unbounded, MemoryPolicy::LastTurns),
            early_stopping: if args.generate_on_limit {
                EarlyStopping::Generate
            } else {
                EarlyStopping::Force
            },
        })
    }

    /// Returns the configuration of the model provider.
    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(self.api_key.clone())
            .with_model(self.model)
            .with_base_url(self.base_url.clone())
            .build()
    }

    /// Applies the agent settings to `builder`.
    pub fn configure(&self, builder: SessionBuilder) -> SessionBuilder {
        builder
            .with_max_iterations(self.max_iterations)
            .with_memory_policy(self.memory_policy)
            .with_early_stopping(self.early_stopping)
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_iterations", &self.max_iterations)
            .field("memory_policy", &self.memory_policy)
            .field("early_stopping", &self.early_stopping)
            .finish()
    }
}
