use scholar_model::{ModelMessage, ModelRequest, ModelTool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A tool call, either a streamed fragment or the assembled call that is
/// replayed in the next request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionToolCall>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    let has_tools = !req.tools.is_empty();
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        // The agent acts on one tool per step, so ask for at most one.
        tool_choice: has_tools.then_some("auto"),
        parallel_tool_calls: has_tools.then_some(false),
        temperature: config.temperature,
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: Some(content.clone()),
            tool_calls: None,
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
        ModelMessage::Opaque(opaque_message) => {
            // Opaque messages from this provider always wrap a `Message`.
            // Anything else came from a different provider; keep its text
            // if it has some.
            if let Some(msg) = opaque_message.to_raw::<Message>() {
                return msg.clone();
            }
            Message::Assistant {
                content: opaque_message.to_raw::<String>().cloned(),
                tool_calls: None,
            }
        }
    }
}

fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use scholar_model::{OpaqueMessage, ToolCallResult};
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    fn lookup_tool() -> ModelTool {
        ModelTool {
            name: "wikipedia".to_owned(),
            description: "Looks up encyclopedia articles.".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }
    }

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a research assistant.".to_owned()),
                ModelMessage::User("Who was Ada Lovelace?".to_owned()),
            ],
            tools: vec![lookup_tool()],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .with_temperature(0.5)
            .build();
        let expected = ChatCompletionRequest {
            model: "custom".to_owned(),
            messages: vec![
                Message::System {
                    content: "You are a research assistant.".to_owned(),
                },
                Message::User {
                    content: "Who was Ada Lovelace?".to_owned(),
                },
            ],
            tools: vec![Tool {
                r#type: "function",
                function: FunctionTool {
                    name: "wikipedia".to_owned(),
                    description: "Looks up encyclopedia articles.".to_owned(),
                    parameters: lookup_tool().parameters,
                },
            }],
            tool_choice: Some("auto"),
            parallel_tool_calls: Some(false),
            temperature: Some(0.5),
            stream: true,
        };
        assert_eq!(create_request(&request, &config), expected);
    }

    #[test]
    fn test_tool_less_request_omits_tool_fields() {
        let request = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx").build();
        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3-8b-8192",
                "messages": [{ "role": "user", "content": "Hi" }],
                "stream": true
            })
        );
    }

    #[test]
    fn test_replayed_tool_call_and_result() {
        let native = Message::Assistant {
            content: None,
            tool_calls: Some(vec![ToolCall {
                index: None,
                id: Some("call_1".to_owned()),
                kind: Some("function".to_owned()),
                function: Some(FunctionToolCall {
                    name: Some("wikipedia".to_owned()),
                    arguments: Some(r#"{"query":"Ada Lovelace"}"#.to_owned()),
                }),
            }]),
        };
        let messages = [
            ModelMessage::Opaque(OpaqueMessage::new("chatcmpl-1", native)),
            ModelMessage::Tool(ToolCallResult {
                id: "call_1".to_owned(),
                content: "Page: Ada Lovelace".to_owned(),
            }),
        ];
        let serialized: Vec<Value> = messages
            .iter()
            .map(|msg| serde_json::to_value(create_message(msg)).unwrap())
            .collect();
        assert_eq!(
            serialized,
            [
                json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "wikipedia",
                            "arguments": "{\"query\":\"Ada Lovelace\"}"
                        }
                    }]
                }),
                json!({
                    "role": "tool",
                    "tool_call_id": "call_1",
                    "content": "Page: Ada Lovelace"
                }),
            ]
        );
    }

    #[test]
    fn test_foreign_opaque_message_keeps_text() {
        let foreign = OpaqueMessage::new("test:1", "I know this.".to_owned());
        assert_eq!(
            create_message(&ModelMessage::Opaque(foreign)),
            Message::Assistant {
                content: Some("I know this.".to_owned()),
                tool_calls: None,
            }
        );
    }
}
