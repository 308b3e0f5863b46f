use serde::{Deserialize, Serialize};

/// Outcome of one shell command execution, serialized verbatim as the
/// tool-result payload fed back to the model.
///
/// A non-zero exit code is a normal `Completed` result; the model
/// interprets it. `Failed` covers launch errors, timeouts, and gate
/// denials (the latter flagged with `denied`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Completed {
        output: String,
        returncode: i32,
    },
    Failed {
        error: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        denied: bool,
    },
}

impl ExecutionResult {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Failed {
            error: message.into(),
            denied: false,
        }
    }

    #[must_use]
    pub fn denied(message: impl Into<String>) -> Self {
        Self::Failed {
            error: message.into(),
            denied: true,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// JSON form used as tool-result message content.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"failed to serialize tool result"}"#.into())
    }
}
