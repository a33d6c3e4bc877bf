use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use scholar_core::tool::Error as ToolError;

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; scholar/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Shared by every tool, so connections are pooled.
static SHARED_CLIENT: OnceLock<Client> = OnceLock::new();

fn client() -> &'static Client {
    SHARED_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("falling back to the default http client: {err}");
                Client::new()
            })
    })
}

/// Fetches `url` and returns the body of a successful response.
pub(crate) async fn get_text(url: &str) -> Result<String, ToolError> {
    trace!("GET {url}");
    let resp = client()
        .get(url)
        .send()
        .await
        .map_err(|err| ToolError::unavailable().with_reason(err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ToolError::unavailable().with_reason(format!("HTTP {status}")));
    }
    resp.text()
        .await
        .map_err(|err| ToolError::unavailable().with_reason(err.to_string()))
}
