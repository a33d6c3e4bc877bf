//! Core logic including the agent loop, tool dispatch and session state.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, CORRECTION_PROMPT, DEFAULT_MAX_ITERATIONS,
    EarlyStopping, EventSink, FORCED_ANSWER, INVALID_RESPONSE, TurnError,
    TurnEvent,
};
pub use model_client::DEFAULT_RETRY_TIMEOUT;
