//! A streaming model provider for OpenAI-compatible chat completion APIs.
//!
//! The defaults point at Groq, but any endpoint that speaks the
//! `/chat/completions` protocol with server-sent events works.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, StatusCode, header};
use scholar_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{DEFAULT_MODEL, GROQ_BASE_URL, OpenAIConfig, OpenAIConfigBuilder};
use io::Sse;
use proto::ErrorBody;
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() || err.is_timeout() {
            ErrorKind::Unavailable
        } else {
            ErrorKind::Other
        };
        Self::new(err.to_string(), kind)
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => ErrorKind::Unauthorized,
            429 => ErrorKind::RateLimitExceeded,
            500..=599 => ErrorKind::Unavailable,
            _ => ErrorKind::Other,
        };
        let detail = serde_json::from_str::<ErrorBody>(body)
            .map(|body| body.error.message)
            .unwrap_or_else(|_| body.trim().to_owned());
        let message = if detail.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {detail}")
        };
        Self::new(message, kind)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration requests are sent with.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        let resp_fut = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&openai_req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(Error::from_transport)?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let err = Error::from_status(status, &body);
                warn!("request rejected: {err}");
                return Err(err);
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.essence_str() == "text/event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            Ok(OpenAIResponse::from_sse(Sse::from_response(resp)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = Error::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#,
        );
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), "HTTP 401 Unauthorized: Invalid API Key");

        let err = Error::from_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.message(), "HTTP 429 Too Many Requests");

        let err = Error::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.message().ends_with("upstream down"));

        let err = Error::from_status(StatusCode::BAD_REQUEST, "{}");
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
