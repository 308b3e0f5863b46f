use crate::channel::ChannelError;
use crate::store::StoreError;
use steward_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("history store error: {0}")]
    Store(#[from] StoreError),
}
