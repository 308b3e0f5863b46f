//! Core agent loop for Steward: command safety classification, the human
//! approval gate, tool orchestration, and chat persistence.

pub mod agent;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod store;

pub use agent::Agent;
pub use classifier::{CommandClassifier, CommandVerdict};
pub use config::Config;
pub use error::AgentError;
pub use gate::{ApprovalGate, ExecutionDecision};
pub use store::{ChatStore, JsonChatStore};
#[cfg(any(test, feature = "mock"))]
pub use store::MemoryChatStore;
