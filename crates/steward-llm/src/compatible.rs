use std::fmt;

use crate::error::LlmError;
use crate::openai::OpenAiProvider;
use crate::provider::{ChatResponse, LlmProvider, Message, ToolDefinition};

/// An OpenAI-compatible endpoint under a configured display name
/// (OpenRouter, Groq, a local proxy, ...).
#[derive(Clone)]
pub struct CompatibleProvider {
    inner: OpenAiProvider,
    provider_name: String,
}

impl CompatibleProvider {
    #[must_use]
    pub fn new(
        provider_name: String,
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        reasoning_effort: Option<String>,
    ) -> Self {
        let inner = OpenAiProvider::new(api_key, base_url, model, max_tokens, reasoning_effort);
        Self {
            inner,
            provider_name,
        }
    }
}

impl fmt::Debug for CompatibleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibleProvider")
            .field("provider_name", &self.provider_name)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl LlmProvider for CompatibleProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.inner.chat(messages).await
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.inner.chat_with_tools(messages, tools).await
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}
