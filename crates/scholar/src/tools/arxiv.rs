use scholar_core::tool::{
    Error as ToolError, LookupResult, Tool, ToolKind, ToolLimits,
};
use serde::Deserialize;

use super::{collapse_whitespace, cut_query, http};

const ARXIV_URL: &str = "https://export.arxiv.org";

#[derive(Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    id: String,
    #[serde(default)]
    published: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Deserialize)]
struct Author {
    name: String,
}

impl Entry {
    // The API reports bad queries as a feed with a single entry like this.
    fn is_error(&self) -> bool {
        self.id.contains("/api/errors")
    }

    fn to_document(&self) -> String {
        let published = self.published.get(..10).unwrap_or(&self.published);
        let authors: Vec<_> =
            self.authors.iter().map(|author| author.name.trim()).collect();
        format!(
            "Published: {published}\nTitle: {}\nAuthors: {}\nSummary: {}",
            collapse_whitespace(&self.title),
            authors.join(", "),
            collapse_whitespace(&self.summary),
        )
    }
}

/// Searches arXiv and returns the metadata of the best matching preprints.
pub struct ArxivTool {
    base_url: String,
    limits: ToolLimits,
}

impl ArxivTool {
    /// Creates a tool that queries the arXiv export API.
    #[inline]
    pub fn new() -> Self {
        Self {
            base_url: ARXIV_URL.to_owned(),
            limits: ToolKind::Arxiv.default_limits(),
        }
    }

    /// Queries another mirror of the API instead.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Overrides the default bounds.
    #[inline]
    pub fn with_limits(mut self, limits: ToolLimits) -> Self {
        self.limits = limits;
        self
    }

    fn query_url(&self, query: &str, max_results: usize) -> String {
        format!(
            "{}/api/query?search_query={}&start=0&max_results={max_results}",
            self.base_url,
            urlencoding::encode(cut_query(query)),
        )
    }
}

impl Default for ArxivTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ArxivTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Arxiv
    }

    fn limits(&self) -> ToolLimits {
        self.limits
    }

    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> impl Future<Output = LookupResult> + Send + 'static {
        let url = self.query_url(&query, max_results);
        async move {
            let body = http::get_text(&url).await?;
            parse_feed(&body)
        }
    }
}

fn parse_feed(body: &str) -> LookupResult {
    let feed: Feed = quick_xml::de::from_str(body).map_err(|err| {
        ToolError::malformed_response().with_reason(err.to_string())
    })?;
    if let Some(error) = feed.entries.iter().find(|entry| entry.is_error()) {
        return Err(ToolError::invalid_input()
            .with_reason(collapse_whitespace(&error.summary)));
    }
    Ok(feed.entries.iter().map(Entry::to_document).collect())
}

#[cfg(test)]
mod tests {
    use scholar_core::tool::ErrorKind;

    use super::*;

    #[test]
    fn test_query_url() {
        let url = ArxivTool::new().query_url("attention is all you need", 1);
        assert_eq!(
            url,
            "https://export.arxiv.org/api/query?search_query=\
             attention%20is%20all%20you%20need&start=0&max_results=1"
        );
    }

    #[test]
    fn test_parse_feed() {
        let docs = parse_feed(include_str!("../../fixtures/arxiv.xml")).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0],
            "Published: 2017-06-12\n\
             Title: Attention Is All You Need\n\
             Authors: Ashish Vaswani, Noam Shazeer\n\
             Summary: The dominant sequence transduction models are based on \
             complex recurrent or convolutional neural networks in an \
             encoder-decoder configuration. We propose a new simple network \
             architecture, the Transformer."
        );
        assert!(docs[1].contains("Title: Language Models are Few-Shot Learners"));
    }

    #[test]
    fn test_error_entry() {
        let err =
            parse_feed(include_str!("../../fixtures/arxiv_error.xml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.reason(), "max_results must be non-negative");
    }

    #[test]
    fn test_empty_and_malformed_feeds() {
        let empty = r#"<feed xmlns="http://www.w3.org/2005/Atom"><id>x</id></feed>"#;
        assert_eq!(parse_feed(empty), Ok(vec![]));
        let err = parse_feed("<feed><entry><title>No id</title></entry></feed>")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}
