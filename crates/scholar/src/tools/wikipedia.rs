use scholar_core::tool::{
    Error as ToolError, LookupResult, Tool, ToolKind, ToolLimits,
};
use serde::Deserialize;

use super::{cut_query, http};

const WIKIPEDIA_URL: &str = "https://en.wikipedia.org";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<QueryResult>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    title: String,
    /// Rank of the page in the search results.
    #[serde(default)]
    index: u32,
    #[serde(default)]
    extract: String,
}

#[derive(Deserialize)]
struct ApiError {
    info: String,
}

/// Searches Wikipedia and returns the introduction of the best matching
/// pages.
pub struct WikipediaTool {
    base_url: String,
    limits: ToolLimits,
}

impl WikipediaTool {
    /// Creates a tool that queries English Wikipedia.
    #[inline]
    pub fn new() -> Self {
        Self {
            base_url: WIKIPEDIA_URL.to_owned(),
            limits: ToolKind::Wikipedia.default_limits(),
        }
    }

    /// Queries another MediaWiki site instead.
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

    fn search_url(&self, query: &str, max_results: usize) -> String {
        format!(
            "{}/w/api.php?action=query&format=json&formatversion=2\
             &generator=search&gsrsearch={}&gsrlimit={max_results}\
             &prop=extracts&exintro=1&explaintext=1&exlimit=max&redirects=1",
            self.base_url,
            urlencoding::encode(cut_query(query)),
        )
    }
}

impl Default for WikipediaTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WikipediaTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Wikipedia
    }

    fn limits(&self) -> ToolLimits {
        self.limits
    }

    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> impl Future<Output = LookupResult> + Send + 'static {
        let url = self.search_url(&query, max_results);
        async move {
            let body = http::get_text(&url).await?;
            parse_search_response(&body)
        }
    }
}

fn parse_search_response(body: &str) -> LookupResult {
    let resp: SearchResponse = serde_json::from_str(body).map_err(|err| {
        ToolError::malformed_response().with_reason(err.to_string())
    })?;
    if let Some(error) = resp.error {
        return Err(ToolError::unavailable().with_reason(error.info));
    }
    // No `query` at all means the search matched nothing.
    let mut pages = resp.query.map(|query| query.pages).unwrap_or_default();
    pages.sort_by_key(|page| page.index);
    Ok(pages
        .into_iter()
        .filter(|page| !page.extract.trim().is_empty())
        .map(|page| {
            format!("Page: {}\nSummary: {}", page.title, page.extract.trim())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let tool = WikipediaTool::new().with_base_url("http://localhost:8080/");
        let url = tool.search_url("Ada Lovelace & Babbage", 2);
        assert!(url.starts_with("http://localhost:8080/w/api.php?"));
        assert!(url.contains("gsrsearch=Ada%20Lovelace%20%26%20Babbage"));
        assert!(url.contains("gsrlimit=2"));
        assert!(url.contains("explaintext=1"));
    }

    #[test]
    fn test_parse_search_response() {
        let docs =
            parse_search_response(include_str!("../../fixtures/wikipedia.json"))
                .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].starts_with(
            "Page: Ada Lovelace\nSummary: Augusta Ada King, Countess of \
             Lovelace"
        ));
        assert!(docs[1].starts_with("Page: Analytical engine\n"));
    }

    #[test]
    fn test_no_match_and_errors() {
        assert_eq!(
            parse_search_response(r#"{"batchcomplete":true}"#),
            Ok(vec![])
        );

        let err = parse_search_response(
            r#"{"error":{"code":"maxlag","info":"Waiting for a database server"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.reason(), "Waiting for a database server");

        let err = parse_search_response("<html>").unwrap_err();
        assert_eq!(
            err.kind(),
            scholar_core::tool::ErrorKind::MalformedResponse
        );
    }
}
