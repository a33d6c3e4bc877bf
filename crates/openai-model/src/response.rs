use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use scholar_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, ToolCallRequest,
};
use serde_json::Value;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, FunctionToolCall, Message, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    content: String,
    tool_calls: Vec<ToolCall>,
    // Tool call fragments keep arriving until the finish reason shows up,
    // so calls are only handed out once `finished` is set.
    pending_tool_call_idx: VecDeque<usize>,
    // Cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    finished: bool,
}

impl PartialState {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            content: String::new(),
            tool_calls: Vec::new(),
            pending_tool_call_idx: VecDeque::new(),
            pending_finish_reason: None,
            finished: false,
        }
    }

    /// Assembles the message to replay in the next request.
    fn finish(self) -> Option<(String, Message)> {
        let id = self.id?;
        let tool_calls: Vec<_> = self
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                index: None,
                id: call.id,
                kind: Some(call.kind.unwrap_or_else(|| "function".to_owned())),
                function: Some(FunctionToolCall {
                    name: call.function.as_ref().and_then(|f| f.name.clone()),
                    arguments: Some(
                        call.function
                            .and_then(|f| f.arguments)
                            .unwrap_or_default(),
                    ),
                }),
            })
            .collect();
        let msg = Message::Assistant {
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        };
        Some((id, msg))
    }

    fn apply_tool_call_fragment(&mut self, fragment: ToolCall) {
        let Some(partial) = self
            .tool_calls
            .iter_mut()
            .find(|t| t.index == fragment.index)
        else {
            self.pending_tool_call_idx.push_back(self.tool_calls.len());
            self.tool_calls.push(fragment);
            return;
        };
        if let Some(id) = fragment.id {
            partial.id.get_or_insert_default().push_str(&id);
        }
        if let Some(kind) = fragment.kind {
            partial.kind.get_or_insert_default().push_str(&kind);
        }
        let Some(function) = fragment.function else {
            return;
        };
        match partial.function {
            Some(ref mut partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial.function = Some(function),
        }
    }

    fn make_tool_call_request(&self, idx: usize) -> ToolCallRequest {
        let tool_call = &self.tool_calls[idx];
        let function = tool_call.function.as_ref();
        ToolCallRequest {
            id: tool_call.id.clone().unwrap_or_default(),
            name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
            arguments: function
                .and_then(|f| f.arguments.as_deref())
                .and_then(|args| serde_json::from_str::<Value>(args).ok())
                .unwrap_or_default(),
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState::new(sse);
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            full_msg: None,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.full_msg = partial_state.finish();
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id, msg.clone()))
    }
}

fn stream_error(message: impl Into<String>) -> Error {
    Error::new(message, ErrorKind::Unavailable)
}

async fn next_event(mut state: PartialState) -> NextEvent {
    let mut message_delta = None;

    while !state.finished && message_delta.is_none() {
        let sse_event = match state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                state.finished = true;
                break;
            }
            Err(err) => return Err(stream_error(format!("{err:?}"))),
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            state.finished = true;
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        // Usage-only chunks carry no choice.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                state.content.push_str(&content);
                message_delta = Some(content);
            }
        }
        for fragment in choice.delta.tool_calls.into_iter().flatten() {
            state.apply_tool_call_fragment(fragment);
        }
        if let Some(finish_reason) = choice.finish_reason {
            state.pending_finish_reason = Some(match finish_reason.as_str() {
                "tool_calls" => ModelFinishReason::ToolCalls,
                "length" => ModelFinishReason::Length,
                _ => ModelFinishReason::Stop,
            });
            state.finished = true;
        }
    }

    // Always emit the message delta first, then the tool calls, and the
    // finish reason last.

    if let Some(message_delta) = message_delta {
        return Ok((Some(ModelResponseEvent::MessageDelta(message_delta)), state));
    }

    if state.finished {
        if let Some(idx) = state.pending_tool_call_idx.pop_front() {
            let event =
                ModelResponseEvent::ToolCall(state.make_tool_call_request(idx));
            return Ok((Some(event), state));
        }
        if let Some(finish_reason) = state.pending_finish_reason.take() {
            return Ok((Some(ModelResponseEvent::Completed(finish_reason)), state));
        }
    }

    Ok((None, state))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;

    async fn collect_events(
        fixture: &'static [u8],
    ) -> (Vec<ModelResponseEvent>, Option<OpaqueMessage>) {
        // Split the body in two so events straddle chunk boundaries.
        let (head, tail) = fixture.split_at(fixture.len() / 2);
        let sse = Sse::replay([Bytes::from_static(head), Bytes::from_static(tail)]);
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        (events, resp.make_opaque_message())
    }

    #[tokio::test]
    async fn test_tool_call_response() {
        let (events, opaque) =
            collect_events(include_bytes!("../fixtures/tool_call_response.txt"))
                .await;

        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta(
                    "I should check the encyclopedia.".to_owned()
                ),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_d5wg".to_owned(),
                    name: "wikipedia".to_owned(),
                    arguments: json!({ "query": "Ada Lovelace" }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );

        let opaque = opaque.unwrap();
        let Some(Message::Assistant {
            content,
            tool_calls: Some(tool_calls),
        }) = opaque.to_raw::<Message>()
        else {
            panic!("expected an assistant message with tool calls");
        };
        assert_eq!(content.as_deref(), Some("I should check the encyclopedia."));
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].index, None);
        assert_eq!(tool_calls[0].kind.as_deref(), Some("function"));
    }

    #[tokio::test]
    async fn test_text_response() {
        let (events, opaque) =
            collect_events(include_bytes!("../fixtures/text_response.txt"))
                .await;

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::MessageDelta(delta) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            text,
            "Machine learning is a field of study in artificial intelligence."
        );
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::Stop))
        );
        let opaque = opaque.unwrap();
        assert_eq!(opaque.id(), "chatcmpl-7f3a");
    }

    #[tokio::test]
    async fn test_mismatched_chunk_id() {
        let body: &'static [u8] = b"data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n\
data: {\"id\":\"b\",\"choices\":[{\"delta\":{\"content\":\"y\"},\"finish_reason\":null}]}\n\n";
        let sse = Sse::replay([Bytes::from_static(body)]);
        let mut resp = pin!(OpenAIResponse::from_sse(sse));

        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(
            first,
            Ok(Some(ModelResponseEvent::MessageDelta(ref d))) if d == "x"
        ));
        let second = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(second.is_err());
        let after = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(after, Ok(None)));
    }
}
