//! The lookup tools a session is equipped with.

mod arxiv;
mod http;
mod web_search;
mod wikipedia;

pub use arxiv::ArxivTool;
pub use web_search::WebSearchTool;
pub use wikipedia::WikipediaTool;

use scholar_core::tool::truncate_chars;

/// Queries longer than this many characters are cut before being sent.
pub const MAX_QUERY_CHARS: usize = 300;

#[inline]
fn cut_query(query: &str) -> &str {
    truncate_chars(query, MAX_QUERY_CHARS)
}

/// Collapses every run of whitespace into a single space.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
