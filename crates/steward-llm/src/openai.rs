use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, ToolDefinition, ToolUseRequest,
};

/// Substrings in a 400 body that identify the "structured tool history not
/// accepted" failure class, as opposed to a generic bad request.
const TOOL_HISTORY_MARKERS: &[&str] = &["tool_call", "tool role", "tool message"];

const ERROR_DETAIL_MAX: usize = 300;

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    reasoning_effort: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("reasoning_effort", &self.reasoning_effort)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        reasoning_effort: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            max_tokens,
            reasoning_effort,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn reasoning(&self) -> Option<Reasoning<'_>> {
        self.reasoning_effort
            .as_deref()
            .map(|effort| Reasoning { effort })
    }

    async fn post_completions<B: Serialize>(
        &self,
        body: &B,
    ) -> Result<(reqwest::StatusCode, String), LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;
        Ok((status, text))
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let api_messages = convert_messages(messages);
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.max_tokens,
            reasoning: self.reasoning(),
        };

        let (status, text) = self.post_completions(&body).await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            tracing::error!("chat request failed with status {status}: {text}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                detail: truncate_detail(&text),
            });
        }

        let resp: CompletionResponse = serde_json::from_str(&text)?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        let api_messages = convert_messages_structured(messages);
        let api_tools: Vec<WireTool> = tools
            .iter()
            .map(|t| WireTool {
                r#type: "function",
                function: WireFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();

        let body = ToolChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens: self.max_tokens,
            tools: &api_tools,
            reasoning: self.reasoning(),
        };

        let (status, text) = self.post_completions(&body).await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if status == reqwest::StatusCode::BAD_REQUEST && is_tool_history_error(&text) {
            tracing::warn!("provider rejected structured tool history: {text}");
            return Err(LlmError::ToolHistoryRejected {
                detail: truncate_detail(&text),
            });
        }
        if !status.is_success() {
            tracing::error!("tool chat request failed with status {status}: {text}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                detail: truncate_detail(&text),
            });
        }

        let resp: CompletionResponse = serde_json::from_str(&text)?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })?;

        let content = choice.message.content.unwrap_or_default();
        if let Some(tool_calls) = choice.message.tool_calls
            && !tool_calls.is_empty()
        {
            let text = if content.is_empty() {
                None
            } else {
                Some(content)
            };
            let calls = tool_calls
                .into_iter()
                .map(|tc| ToolUseRequest {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect();
            return Ok(ChatResponse::ToolUse {
                text,
                tool_calls: calls,
            });
        }

        Ok(ChatResponse::Text(content))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }
}

fn is_tool_history_error(body: &str) -> bool {
    let lower = body.to_lowercase();
    TOOL_HISTORY_MARKERS.iter().any(|m| lower.contains(m))
}

fn truncate_detail(text: &str) -> String {
    if text.len() <= ERROR_DETAIL_MAX {
        return text.to_owned();
    }
    let truncated: String = text.chars().take(ERROR_DETAIL_MAX).collect();
    format!("{truncated}…")
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|msg| ApiMessage {
            role: role_str(msg.role),
            content: &msg.content,
        })
        .collect()
}

/// Map canonical messages to wire form: assistant `ToolUse` parts become
/// `tool_calls`, `ToolResult` parts become one `role:"tool"` message each,
/// everything else is sent as plain text.
fn convert_messages_structured(messages: &[Message]) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        if !msg.has_tool_parts() {
            out.push(WireMessage {
                role: role_str(msg.role),
                content: msg.content.clone(),
                tool_calls: None,
                tool_call_id: None,
            });
            continue;
        }

        if msg.role == Role::Assistant {
            let text: String = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("");
            let tool_calls: Vec<WireToolCallOut> = msg
                .parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::ToolUse {
                        id,
                        name,
                        arguments,
                    } => Some(WireToolCallOut {
                        id: id.clone(),
                        r#type: "function",
                        function: WireFunctionCall {
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                    }),
                    _ => None,
                })
                .collect();
            out.push(WireMessage {
                role: "assistant",
                content: text,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            });
        } else {
            for part in &msg.parts {
                if let MessagePart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = part
                {
                    out.push(WireMessage {
                        role: "tool",
                        content: content.clone(),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    });
                }
            }
        }
    }

    out
}

#[derive(Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireToolCallOut {
    id: String,
    r#type: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize)]
struct ToolChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    max_tokens: u32,
    tools: &'a [WireTool<'a>],
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallIn>>,
}

#[derive(Deserialize)]
struct WireToolCallIn {
    id: String,
    function: WireFunctionCallIn,
}

#[derive(Deserialize)]
struct WireFunctionCallIn {
    name: String,
    arguments: String,
}
