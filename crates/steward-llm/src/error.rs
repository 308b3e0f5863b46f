#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("API request failed (status {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("provider rejected structured tool history: {detail}")]
    ToolHistoryRejected { detail: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
