//! Lookup tool supports.

mod error;
mod toolbox;

use std::pin::Pin;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use toolbox::{Observation, Toolbox};

/// The result of a lookup: the documents found, best match first.
pub type LookupResult = Result<Vec<String>, Error>;

/// The closed set of lookup tools an agent can be given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    /// Encyclopedia lookup.
    Wikipedia,
    /// Preprint lookup.
    Arxiv,
    /// General web search.
    WebSearch,
}

impl ToolKind {
    /// Every tool kind, in the order tools are offered to the model.
    pub const ALL: [ToolKind; 3] =
        [ToolKind::Wikipedia, ToolKind::Arxiv, ToolKind::WebSearch];

    /// Returns the name the model calls this tool by.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Wikipedia => "wikipedia",
            ToolKind::Arxiv => "arxiv",
            ToolKind::WebSearch => "duckduckgo_search",
        }
    }

    /// Returns the human readable name of the service.
    pub fn title(self) -> &'static str {
        match self {
            ToolKind::Wikipedia => "Wikipedia",
            ToolKind::Arxiv => "Arxiv",
            ToolKind::WebSearch => "DuckDuckGo Search",
        }
    }

    /// Returns the description shown to the model.
    pub fn description(self) -> &'static str {
        match self {
            ToolKind::Wikipedia => {
                "A wrapper around Wikipedia. Useful for when you need to \
                 answer general questions about people, places, companies, \
                 facts, historical events, or other subjects. Input should \
                 be a search query."
            }
            ToolKind::Arxiv => {
                "A wrapper around Arxiv.org. Useful for when you need to \
                 answer questions about Physics, Mathematics, Computer \
                 Science, Quantitative Biology, Quantitative Finance, \
                 Statistics, Electrical Engineering, and Economics from \
                 scientific articles on arxiv.org. Input should be a search \
                 query."
            }
            ToolKind::WebSearch => {
                "A wrapper around DuckDuckGo Search. Useful for when you \
                 need to answer questions about current events. Input \
                 should be a search query."
            }
        }
    }

    /// Returns the bounds a tool of this kind starts with.
    pub fn default_limits(self) -> ToolLimits {
        match self {
            ToolKind::Wikipedia | ToolKind::Arxiv => ToolLimits {
                max_results: 1,
                max_chars: 250,
            },
            ToolKind::WebSearch => ToolLimits {
                max_results: 4,
                max_chars: 1000,
            },
        }
    }

    /// Looks up a tool kind by the name the model used.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Bounds applied to every lookup of a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ToolLimits {
    /// How many documents the service may return.
    pub max_results: usize,
    /// Length, in characters, the joined documents are cut to.
    pub max_chars: usize,
}

/// The arguments every lookup tool accepts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ToolInput {
    /// The search query.
    pub query: String,
}

/// An external lookup service the model can call.
///
/// Implementations should be stateless apart from their configuration,
/// which is fixed when the tool is created.
pub trait Tool: Send + Sync + 'static {
    /// Returns which tool this is.
    fn kind(&self) -> ToolKind;

    /// Returns the bounds of this tool.
    fn limits(&self) -> ToolLimits {
        self.kind().default_limits()
    }

    /// Looks up at most `max_results` documents for `query`.
    ///
    /// This method must return a future that is fully independent of `self`.
    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> impl Future<Output = LookupResult> + Send + 'static;
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn limits(&self) -> ToolLimits;

    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = LookupResult> + Send>>;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn limits(&self) -> ToolLimits {
        self.0.limits()
    }

    #[inline]
    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = LookupResult> + Send>> {
        Box::pin(self.0.lookup(query, max_results))
    }
}

/// Extracts the query from the arguments of a tool call.
///
/// Both `{"query": "..."}` and a bare JSON string are accepted.
pub(crate) fn parse_query(arguments: Value) -> Result<String, String> {
    let query = match arguments {
        Value::String(query) => query,
        Value::Null => return Err("missing arguments".to_owned()),
        other => {
            serde_json::from_value::<ToolInput>(other)
                .map_err(|err| err.to_string())?
                .query
        }
    };
    let query = query.trim();
    if query.is_empty() {
        return Err("the query is empty".to_owned());
    }
    Ok(query.to_owned())
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
