//! Test-only scripted LLM provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{
    ChatResponse, LlmProvider, Message, ToolDefinition, ToolUseRequest,
};

/// One scripted reply, consumed in order.
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolUseRequest>),
    RateLimited,
    ToolHistoryRejected,
    Error(String),
}

impl MockReply {
    #[must_use]
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self::ToolCalls(vec![ToolUseRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }])
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Every message list this provider was called with, for assertions on
    /// the outgoing payload (e.g. the plain-text degradation).
    pub requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    #[must_use]
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scripted classifier verdicts, one JSON body per upcoming call.
    #[must_use]
    pub fn with_verdicts(verdicts: &[(bool, &str)]) -> Self {
        let replies = verdicts
            .iter()
            .map(|(modifies, description)| {
                MockReply::Text(format!(
                    r#"{{"modifies": {modifies}, "description": "{description}"}}"#
                ))
            })
            .collect();
        Self::with_replies(replies)
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("mock response".into()))
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn record(&self, messages: &[Message]) {
        self.requests.lock().unwrap().push(messages.to_vec());
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.record(messages);
        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::ToolCalls(_) => Ok(String::new()),
            MockReply::RateLimited => Err(LlmError::RateLimited),
            MockReply::ToolHistoryRejected => Err(LlmError::ToolHistoryRejected {
                detail: "mock rejection".into(),
            }),
            MockReply::Error(msg) => Err(LlmError::Other(msg)),
        }
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.record(messages);
        match self.next_reply() {
            MockReply::Text(text) => Ok(ChatResponse::Text(text)),
            MockReply::ToolCalls(tool_calls) => Ok(ChatResponse::ToolUse {
                text: None,
                tool_calls,
            }),
            MockReply::RateLimited => Err(LlmError::RateLimited),
            MockReply::ToolHistoryRejected => Err(LlmError::ToolHistoryRejected {
                detail: "mock rejection".into(),
            }),
            MockReply::Error(msg) => Err(LlmError::Other(msg)),
        }
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
