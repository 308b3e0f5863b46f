use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Structured segment of a message. Tool calls and their results are kept in
/// structured form in the canonical history; the wire layer decides how to
/// render them for a given provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    /// A tool invocation requested by the model, recorded verbatim.
    /// `arguments` stays the raw JSON-encoded string the model produced;
    /// it is parsed only at dispatch time.
    ToolUse {
        id: String,
        name: String,
        arguments: String,
    },
    /// The answer to exactly one prior `ToolUse`, correlated by id.
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl Message {
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parts: vec![],
        }
    }

    /// Build a message from structured parts. `content` is a plain-text
    /// rendering used for display and logging only.
    #[must_use]
    pub fn from_parts(role: Role, parts: Vec<MessagePart>) -> Self {
        let content = render_parts(&parts);
        Self {
            role,
            content,
            parts,
        }
    }

    #[must_use]
    pub fn has_tool_parts(&self) -> bool {
        self.parts.iter().any(|p| {
            matches!(
                p,
                MessagePart::ToolUse { .. } | MessagePart::ToolResult { .. }
            )
        })
    }
}

fn render_parts(parts: &[MessagePart]) -> String {
    let mut out = String::new();
    for part in parts {
        if !out.is_empty() {
            out.push('\n');
        }
        match part {
            MessagePart::Text { text } => out.push_str(text),
            MessagePart::ToolUse { id, name, .. } => {
                out.push_str(&format!("[tool_use: {name}({id})]"));
            }
            MessagePart::ToolResult { tool_use_id, .. } => {
                out.push_str(&format!("[tool_result: {tool_use_id}]"));
            }
        }
    }
    out
}

/// Rewrite structured tool history into role-appropriate plain text for
/// providers that reject tool-shaped messages in the prompt.
///
/// This transform is lossy and one-way: it applies only to the outgoing
/// request payload, never to the canonical history.
#[must_use]
pub fn flatten_history(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|msg| {
            if !msg.has_tool_parts() {
                return msg.clone();
            }
            let mut lines = Vec::new();
            for part in &msg.parts {
                match part {
                    MessagePart::Text { text } => {
                        if !text.is_empty() {
                            lines.push(text.clone());
                        }
                    }
                    MessagePart::ToolUse {
                        name, arguments, ..
                    } => {
                        lines.push(format!("You invoked tool {name} with arguments {arguments}."));
                    }
                    MessagePart::ToolResult { content, .. } => {
                        lines.push(format!("Tool result: {content}"));
                    }
                }
            }
            Message::text(msg.role, lines.join("\n"))
        })
        .collect()
}

/// Declared signature of a tool offered to the model.
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded argument payload, parsed by the dispatcher.
    pub arguments: String,
}

/// Outcome of a model turn: either a final text answer or a batch of tool
/// invocations to dispatch before asking again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatResponse {
    Text(String),
    ToolUse {
        text: Option<String>,
        tool_calls: Vec<ToolUseRequest>,
    },
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant response text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is invalid.
    fn chat(&self, messages: &[Message]) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Send messages plus tool declarations and return either text or a
    /// batch of tool-call requests.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ToolHistoryRejected` when the provider refuses
    /// structured tool messages in the prompt, or other variants on
    /// transport/response failures.
    fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_use(id: &str, name: &str, args: &str) -> MessagePart {
        MessagePart::ToolUse {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn text_message_has_no_parts() {
        let msg = Message::text(Role::User, "hello");
        assert_eq!(msg.content, "hello");
        assert!(msg.parts.is_empty());
        assert!(!msg.has_tool_parts());
    }

    #[test]
    fn from_parts_renders_tool_use_tags() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                MessagePart::Text {
                    text: "let me check".into(),
                },
                tool_use("call_1", "run_terminal_command", r#"{"command":"ls"}"#),
            ],
        );
        assert!(msg.content.contains("let me check"));
        assert!(msg.content.contains("[tool_use: run_terminal_command(call_1)]"));
        assert!(msg.has_tool_parts());
    }

    #[test]
    fn from_parts_renders_tool_result_tags() {
        let msg = Message::from_parts(
            Role::User,
            vec![MessagePart::ToolResult {
                tool_use_id: "call_1".into(),
                content: "{}".into(),
                is_error: false,
            }],
        );
        assert_eq!(msg.content, "[tool_result: call_1]");
    }

    #[test]
    fn flatten_preserves_plain_messages() {
        let history = vec![
            Message::text(Role::System, "be helpful"),
            Message::text(Role::User, "hi"),
            Message::text(Role::Assistant, "hello"),
        ];
        let flat = flatten_history(&history);
        assert_eq!(flat.len(), 3);
        for (a, b) in history.iter().zip(&flat) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
        assert!(flat.iter().all(|m| m.parts.is_empty()));
    }

    #[test]
    fn flatten_rewrites_tool_use_as_assistant_text() {
        let history = vec![Message::from_parts(
            Role::Assistant,
            vec![tool_use("call_9", "run_terminal_command", r#"{"command":"ls"}"#)],
        )];
        let flat = flatten_history(&history);
        assert_eq!(flat[0].role, Role::Assistant);
        assert_eq!(
            flat[0].content,
            r#"You invoked tool run_terminal_command with arguments {"command":"ls"}."#
        );
        assert!(flat[0].parts.is_empty());
    }

    #[test]
    fn flatten_rewrites_tool_result_as_user_text() {
        let history = vec![Message::from_parts(
            Role::User,
            vec![MessagePart::ToolResult {
                tool_use_id: "call_9".into(),
                content: r#"{"output":"ok","returncode":0}"#.into(),
                is_error: false,
            }],
        )];
        let flat = flatten_history(&history);
        assert_eq!(flat[0].role, Role::User);
        assert_eq!(
            flat[0].content,
            r#"Tool result: {"output":"ok","returncode":0}"#
        );
    }

    #[test]
    fn flatten_keeps_leading_text_of_tool_call_message() {
        let history = vec![Message::from_parts(
            Role::Assistant,
            vec![
                MessagePart::Text {
                    text: "checking".into(),
                },
                tool_use("c1", "run_terminal_command", "{}"),
            ],
        )];
        let flat = flatten_history(&history);
        assert!(flat[0].content.starts_with("checking\n"));
        assert!(flat[0].content.contains("You invoked tool"));
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                MessagePart::Text { text: "hi".into() },
                tool_use("c1", "run_terminal_command", r#"{"command":"pwd"}"#),
            ],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.parts, msg.parts);
        assert_eq!(back.content, msg.content);
    }

    #[test]
    fn plain_message_serializes_without_parts_field() {
        let json = serde_json::to_string(&Message::text(Role::User, "hi")).unwrap();
        assert!(!json.contains("parts"));
    }
}
