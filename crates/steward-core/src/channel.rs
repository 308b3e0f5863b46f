/// Typed error for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input side closed (EOF, interrupt, or a missing scripted reply).
    #[error("channel closed")]
    Closed,

    /// Catch-all for backend-specific errors.
    #[error("{0}")]
    Other(String),
}

/// Incoming utterance from the operator.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub text: String,
}

/// Bidirectional terminal surface for the agent.
///
/// `prompt` is the blocking single-line input the approval gate negotiates
/// through. There is deliberately no timeout: operator input is
/// authoritative.
pub trait Channel: Send {
    /// Receive the next operator utterance. Returns `None` on end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn recv(&mut self)
    -> impl Future<Output = Result<Option<ChannelMessage>, ChannelError>> + Send;

    /// Display a text response.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Ask the operator for one line of input and block until it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if input is no longer available.
    fn prompt(&mut self, prompt: &str)
    -> impl Future<Output = Result<String, ChannelError>> + Send;
}
