use scholar_model::ErrorKind;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::conversation::SessionError;
use crate::tool::{Observation, ToolKind};

/// Progress of a turn, reported while the turn is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    /// A reasoning iteration started and the model is being asked.
    Thinking {
        /// One-based number of the iteration. The best-effort call made
        /// after the cap is numbered one past it.
        iteration: usize,
    },
    /// A piece of text streamed from the model.
    Token(String),
    /// The model chose a tool.
    Action {
        /// The tool being invoked.
        tool: ToolKind,
        /// The query passed to it.
        query: String,
    },
    /// A tool returned.
    Observation {
        /// The tool that was invoked.
        tool: ToolKind,
        /// What the model will see.
        observation: Observation,
    },
    /// The model response could not be used and a correction was sent.
    Correction {
        /// Why the response was rejected.
        reason: String,
    },
    /// The iteration cap was hit.
    IterationLimit {
        /// The number of iterations that ran.
        iterations: usize,
    },
}

/// Where a running turn reports its [`TurnEvent`]s.
///
/// Sending never blocks and never fails the turn: events for a receiver
/// that went away are dropped.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<TurnEvent>>,
}

impl EventSink {
    /// Creates a sink together with the receiver of its events.
    #[inline]
    pub fn channel() -> (Self, UnboundedReceiver<TurnEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Creates a sink that drops every event.
    #[inline]
    pub fn discard() -> Self {
        Self { tx: None }
    }

    #[inline]
    pub(crate) fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.tx {
            tx.send(event).ok();
        }
    }
}

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Nothing was typed.
    #[error("the input is empty")]
    EmptyInput,
    /// The model provider could not be reached, rejected the request, or
    /// broke off the response.
    #[error("model request failed ({kind}): {message}")]
    Model {
        /// The kind reported by the provider.
        kind: ErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The answer could not be recorded.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TurnError {
    /// Returns the provider error kind, if the model call failed.
    #[inline]
    pub fn model_error_kind(&self) -> Option<ErrorKind> {
        match self {
            TurnError::Model { kind, .. } => Some(*kind),
            TurnError::EmptyInput | TurnError::Session(_) => None,
        }
    }
}
