use scholar_core::tool::{
    Error as ToolError, LookupResult, Tool, ToolKind, ToolLimits,
};
use scraper::{ElementRef, Html, Selector};

use super::{collapse_whitespace, http};

const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";

/// Searches the web through the DuckDuckGo HTML endpoint.
pub struct WebSearchTool {
    base_url: String,
    limits: ToolLimits,
}

impl WebSearchTool {
    /// Creates a tool that queries DuckDuckGo.
    #[inline]
    pub fn new() -> Self {
        Self {
            base_url: DUCKDUCKGO_URL.to_owned(),
            limits: ToolKind::WebSearch.default_limits(),
        }
    }

    /// Queries another endpoint that serves the same page layout.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default bounds.
    #[inline]
    pub fn with_limits(mut self, limits: ToolLimits) -> Self {
        self.limits = limits;
        self
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}?q={}", self.base_url, urlencoding::encode(query))
    }
}

impl Default for WebSearchTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for WebSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn limits(&self) -> ToolLimits {
        self.limits
    }

    fn lookup(
        &self,
        query: String,
        max_results: usize,
    ) -> impl Future<Output = LookupResult> + Send + 'static {
        let url = self.search_url(&query);
        async move {
            let html = http::get_text(&url).await?;
            // `Html` is not `Send`, keep it out of the future.
            parse_results(&html, max_results)
        }
    }
}

fn selector(css: &'static str) -> Result<Selector, ToolError> {
    Selector::parse(css).map_err(|err| {
        ToolError::malformed_response()
            .with_reason(format!("bad selector `{css}`: {err:?}"))
    })
}

fn text_of(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Result links point at a redirect that carries the target in `uddg`.
fn resolve_link(href: &str) -> String {
    let Some((_, rest)) = href.split_once("uddg=") else {
        return href.to_owned();
    };
    let encoded = rest.split('&').next().unwrap_or(rest);
    urlencoding::decode(encoded)
        .map(|url| url.into_owned())
        .unwrap_or_else(|_| href.to_owned())
}

fn parse_results(html: &str, limit: usize) -> LookupResult {
    let document = Html::parse_document(html);
    if document.select(&selector(".anomaly-modal__modal")?).next().is_some()
    {
        return Err(ToolError::unavailable()
            .with_reason("the search was rejected as automated traffic"));
    }

    let result_selector = selector(".result:not(.result--ad)")?;
    let title_selector = selector(".result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut docs = vec![];
    for result in document.select(&result_selector) {
        if docs.len() >= limit {
            break;
        }
        let Some(link) = result.select(&title_selector).next() else {
            continue;
        };
        let title = text_of(link);
        let url = link.value().attr("href").map(resolve_link).unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(text_of)
            .unwrap_or_default();
        docs.push(format!("{title}\n{snippet}\n{url}"));
    }
    Ok(docs)
}
