//! The protocol between the chat agent and a hosted language model.
//!
//! A provider receives a [`ModelRequest`] (history plus the tools the model
//! may call) and answers with a stream of [`ModelResponseEvent`]s: text
//! deltas, tool call requests and a final completion marker. Nothing here
//! talks to the network; the types only fix the shape every provider
//! implementation has to follow, so the agent loop can run against a hosted
//! endpoint or a scripted fake without changes.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
