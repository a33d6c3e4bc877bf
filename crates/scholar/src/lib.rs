//! A chat assistant that looks things up before it answers.
//!
//! The assistant can search Wikipedia, arXiv and the web (through
//! DuckDuckGo) while reasoning about a question. The crate ships a terminal
//! chat program, and the [`Session`] type can be used to embed the same
//! assistant in other hosts.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod config;
mod session;
pub mod shell;
pub mod tools;

pub use session::{Session, SessionBuilder};
pub use shell::ChatShell;

/// Re-exports of [`scholar_core`] crate.
pub mod core {
    pub use scholar_core::*;
}
