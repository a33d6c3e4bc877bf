//! A scripted in-process model for tests.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use scholar_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, OpaqueMessage,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    fn new(message: &'static str, kind: ErrorKind) -> Self {
        Self { message, kind }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    id: String,
    transcript: String,
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn from_preset(id: String, preset: PresetResponse, delay: Duration) -> Self {
        let finish_reason = if preset.has_tool_call() {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        let mut transcript = String::new();
        let mut events: VecDeque<_> = preset
            .events
            .into_iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(delta) => {
                    transcript.push_str(&delta);
                    ModelResponseEvent::MessageDelta(delta)
                }
                PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(finish_reason));
        Self {
            id,
            transcript,
            events,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            return Poll::Ready(Ok(None));
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        Poll::Ready(Ok(this.events.pop_front()))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        Some(OpaqueMessage::new(self.id.clone(), self.transcript.clone()))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    fallback: Option<PresetResponse>,
    failed_attempts: u64,
    requests: Vec<ModelRequest>,
}

impl Script {
    fn next_response(&mut self) -> Result<PresetResponse, Error> {
        let Some(front) = self.responses.front() else {
            return match &self.fallback {
                Some(fallback) => Ok(fallback.clone()),
                None => Err(Error::new("script exhausted", ErrorKind::Other)),
            };
        };

        let (failures, kind) = (front.failures, front.failure_kind);
        match failures {
            Some(0) => return Err(Error::new("injected failure", kind)),
            Some(n) if self.failed_attempts < n => {
                self.failed_attempts += 1;
                return Err(Error::new("injected failure", kind));
            }
            _ => {}
        }

        self.failed_attempts = 0;
        self.responses
            .pop_front()
            .ok_or(Error::new("script exhausted", ErrorKind::Other))
    }
}

/// A local fake model for testing purpose.
///
/// Responses are handed out in the order they were added, one per request,
/// regardless of what the request contains. When the script runs dry the
/// fallback response (if any) is repeated forever, otherwise requests fail.
/// Every request is recorded and can be inspected afterwards.
///
/// Clones share the same script, so a test can keep a handle while the
/// agent owns another one.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    /// Sets the response used once the scripted ones are used up.
    #[inline]
    pub fn set_fallback_response(&self, preset: PresetResponse) {
        self.script().fallback = Some(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script().requests.clone()
    }

    #[inline]
    pub fn request_count(&self) -> usize {
        self.script().requests.len()
    }

    #[inline]
    pub fn remaining_responses(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let id = format!("test:{}", script.requests.len());
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let result = script
            .next_response()
            .map(|preset| TestModelResponse::from_preset(id, preset, delay));
        ready(result)
    }
}
