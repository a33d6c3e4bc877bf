use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::{Pin, pin};
use std::task::{self, Poll, ready};
use std::time::Duration;

use scholar_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ModelTool, ToolCallRequest,
};
use serde_json::json;
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for EchoError {}

impl ModelProviderError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Streams the last user message back word by word, or asks for a lookup
/// when a tool is offered.
struct EchoResponse {
    events: VecDeque<ModelResponseEvent>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for EchoResponse {
    type Error = EchoError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.events.pop_front()))
    }
}

struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.clone()),
            _ => None,
        });
        let result = match last_user {
            None => Err(EchoError(ErrorKind::Other)),
            Some(text) => {
                let mut events: VecDeque<_> = text
                    .split_inclusive(' ')
                    .map(|word| ModelResponseEvent::MessageDelta(word.to_owned()))
                    .collect();
                let reason = match req.tools.first() {
                    Some(tool) => {
                        events.push_back(ModelResponseEvent::ToolCall(
                            ToolCallRequest {
                                id: "call_0".to_owned(),
                                name: tool.name.clone(),
                                arguments: json!({ "query": text }),
                            },
                        ));
                        ModelFinishReason::ToolCalls
                    }
                    None => ModelFinishReason::Stop,
                };
                events.push_back(ModelResponseEvent::Completed(reason));
                Ok(EchoResponse {
                    events,
                    sleep: None,
                })
            }
        };
        ready(result)
    }
}

async fn drain(resp: EchoResponse) -> Vec<ModelResponseEvent> {
    let mut resp = pin!(resp);
    let mut events = vec![];
    while let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
        .await
        .unwrap()
    {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_streamed_text() {
    let req = ModelRequest {
        messages: vec![
            ModelMessage::System("Be brief.".to_owned()),
            ModelMessage::User("Good morning".to_owned()),
        ],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let events = drain(resp).await;

    let text: String = events
        .iter()
        .filter_map(|event| match event {
            ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Good morning");
    assert_eq!(
        events.last(),
        Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
    );
}

#[tokio::test]
async fn test_tool_call_comes_before_completion() {
    let req = ModelRequest {
        messages: vec![ModelMessage::User("rust language".to_owned())],
        tools: vec![ModelTool {
            name: "wikipedia".to_owned(),
            description: "Looks up encyclopedia articles.".to_owned(),
            parameters: json!({ "type": "object" }),
        }],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let events = drain(resp).await;

    let n = events.len();
    assert!(matches!(
        &events[n - 2],
        ModelResponseEvent::ToolCall(call) if call.name == "wikipedia"
            && call.arguments == json!({ "query": "rust language" })
    ));
    assert_eq!(
        events[n - 1],
        ModelResponseEvent::Completed(ModelFinishReason::ToolCalls)
    );
}

#[tokio::test]
async fn test_error() {
    let result = EchoProvider.send_request(&ModelRequest::default()).await;
    let Err(err) = result else {
        panic!("expected an error");
    };
    assert_eq!(err.kind(), ErrorKind::Other);
}
