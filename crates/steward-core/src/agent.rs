use steward_llm::LlmError;
use steward_llm::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, ToolDefinition, ToolUseRequest,
    flatten_history,
};
use steward_llm::retry::RetryPolicy;
use steward_tools::executor::ExecutionResult;
use steward_tools::registry::{CommandParams, RUN_TERMINAL_COMMAND, terminal_command_tool};
use steward_tools::shell::ShellExecutor;
use tokio::sync::watch;

use crate::channel::{Channel, ChannelError};
use crate::error::AgentError;
use crate::gate::{ApprovalGate, ExecutionDecision};
use crate::store::{ChatStore, DEFAULT_CHAT, StoreError};

const HELP_TEXT: &str = "Commands:\n  /clear         reset the current conversation\n  /chat <name>   switch to another chat\n  /chats         list chats\n  /drop <name>   delete a chat\n  /help          show this help\nType 'exit' or press Ctrl-C to leave.";

/// The conversation loop: sends history to the model, dispatches requested
/// tool calls through the approval gate and shell executor, and feeds
/// results back until the model produces a final answer or the iteration
/// bound is hit.
///
/// One turn runs start to finish before the next utterance is accepted;
/// tool calls within a batch are dispatched strictly in order because
/// approval is a stateful human interaction.
pub struct Agent<P, Q, C, S> {
    provider: P,
    gate: ApprovalGate<Q>,
    shell: ShellExecutor,
    channel: C,
    store: S,
    retry: RetryPolicy,
    system_prompt: String,
    max_tool_iterations: usize,
    messages: Vec<Message>,
    chat_name: String,
    /// Once a provider rejects structured tool history, every later request
    /// is sent pre-flattened.
    degraded_history: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<P, Q, C, S> Agent<P, Q, C, S>
where
    P: LlmProvider,
    Q: LlmProvider,
    C: Channel,
    S: ChatStore,
{
    pub fn new(
        provider: P,
        gate: ApprovalGate<Q>,
        shell: ShellExecutor,
        channel: C,
        store: S,
        system_prompt: impl Into<String>,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let messages = vec![Message::text(Role::System, &system_prompt)];
        Self {
            provider,
            gate,
            shell,
            channel,
            store,
            retry: RetryPolicy::default(),
            system_prompt,
            max_tool_iterations: 10,
            messages,
            chat_name: DEFAULT_CHAT.to_owned(),
            degraded_history: false,
            shutdown: None,
        }
    }

    #[must_use]
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn chat_name(&self) -> &str {
        &self.chat_name
    }

    /// Switch the session to `name`, loading its persisted history or
    /// starting fresh.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid name or a failed read.
    pub async fn load_chat(&mut self, name: &str) -> Result<(), AgentError> {
        let loaded = self.store.load(name).await?;
        self.messages = match loaded {
            Some(mut messages) => {
                if messages.first().is_none_or(|m| m.role != Role::System) {
                    messages.insert(0, Message::text(Role::System, &self.system_prompt));
                }
                messages
            }
            None => vec![Message::text(Role::System, &self.system_prompt)],
        };
        self.chat_name = name.to_owned();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be written.
    pub async fn save_chat(&self) -> Result<(), StoreError> {
        self.store.save(&self.chat_name, &self.messages).await
    }

    async fn try_save(&mut self) {
        if let Err(e) = self.save_chat().await {
            tracing::warn!("failed to save chat '{}': {e}", self.chat_name);
        }
    }

    /// Main loop: read utterances until end of input or shutdown, running
    /// one turn at a time. The current chat is saved after every turn and
    /// on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel or store fails unrecoverably;
    /// model failures end the turn with a message and the loop continues.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        loop {
            let received = tokio::select! {
                message = self.channel.recv() => message?,
                () = shutdown_signal(&mut self.shutdown) => {
                    tracing::info!("shutdown signal received");
                    self.try_save().await;
                    return Ok(());
                }
            };

            let Some(message) = received else {
                self.try_save().await;
                return Ok(());
            };

            let input = message.text.trim().to_owned();
            if input.is_empty() {
                continue;
            }
            if input.starts_with('/') {
                self.handle_slash_command(&input).await?;
                continue;
            }

            match self.run_turn(&input).await {
                Ok(()) => {}
                Err(AgentError::Llm(e)) => {
                    tracing::error!("turn aborted by provider failure: {e}");
                    self.channel
                        .send(&format!(
                            "The model request failed: {e}. The conversation so far is preserved; try again."
                        ))
                        .await?;
                }
                Err(e) => {
                    self.try_save().await;
                    return Err(e);
                }
            }
            self.try_save().await;
        }
    }

    /// Process one operator utterance to completion.
    ///
    /// # Errors
    ///
    /// Provider errors abort the turn (history up to that point is kept);
    /// channel errors propagate. Failures inside a single tool dispatch do
    /// not surface here; they become error-shaped tool results.
    pub async fn run_turn(&mut self, input: &str) -> Result<(), AgentError> {
        self.messages.push(Message::text(Role::User, input));
        let tools = tool_definitions();

        for iteration in 0..self.max_tool_iterations {
            let response = self.request_completion(&tools).await?;

            match response {
                ChatResponse::Text(text) => {
                    if !text.is_empty() {
                        self.channel.send(&text).await?;
                    }
                    self.messages.push(Message::text(Role::Assistant, text));
                    return Ok(());
                }
                ChatResponse::ToolUse { text, tool_calls } => {
                    tracing::info!(
                        iteration,
                        count = tool_calls.len(),
                        "model requested tool calls"
                    );
                    if let Some(ref text) = text
                        && !text.is_empty()
                    {
                        self.channel.send(text).await?;
                    }

                    let mut parts = Vec::with_capacity(tool_calls.len() + 1);
                    if let Some(text) = text
                        && !text.is_empty()
                    {
                        parts.push(MessagePart::Text { text });
                    }
                    for request in &tool_calls {
                        parts.push(MessagePart::ToolUse {
                            id: request.id.clone(),
                            name: request.name.clone(),
                            arguments: request.arguments.clone(),
                        });
                    }
                    self.messages.push(Message::from_parts(Role::Assistant, parts));

                    self.dispatch_batch(&tool_calls).await?;
                }
            }
        }

        tracing::warn!(
            limit = self.max_tool_iterations,
            "tool iteration limit reached without a final answer"
        );
        self.channel
            .send("Stopping: reached the tool iteration limit without a final answer.")
            .await?;
        Ok(())
    }

    /// Answer every request in the batch, in order, with exactly one result
    /// part per request id. If the channel dies mid-batch the remaining
    /// requests are answered with an aborted-dispatch error before the
    /// failure propagates, so persisted history never contains an
    /// unanswered tool call.
    async fn dispatch_batch(&mut self, tool_calls: &[ToolUseRequest]) -> Result<(), AgentError> {
        let mut results = Vec::with_capacity(tool_calls.len());
        let mut failure = None;

        for (idx, request) in tool_calls.iter().enumerate() {
            match self.execute_request(request).await {
                Ok(result) => {
                    results.push(result_part(request, &result));
                }
                Err(e) => {
                    let aborted = ExecutionResult::error(format!("Tool dispatch aborted: {e}"));
                    for remaining in &tool_calls[idx..] {
                        results.push(result_part(remaining, &aborted));
                    }
                    failure = Some(e);
                    break;
                }
            }
        }

        self.messages.push(Message::from_parts(Role::User, results));

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn execute_request(
        &mut self,
        request: &ToolUseRequest,
    ) -> Result<ExecutionResult, ChannelError> {
        if request.name != RUN_TERMINAL_COMMAND {
            tracing::warn!("model requested unknown tool: {}", request.name);
            return Ok(ExecutionResult::error(format!(
                "Unknown tool: {}",
                request.name
            )));
        }

        let params = match CommandParams::from_raw(&request.arguments) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("malformed tool arguments: {e}");
                return Ok(ExecutionResult::error(format!(
                    "Invalid tool arguments: {e}"
                )));
            }
        };

        match self.gate.review(&mut self.channel, &params.command).await? {
            ExecutionDecision::Proceed(command) => {
                self.channel.send(&format!("Running: {command}")).await?;
                Ok(self.shell.run(&command).await)
            }
            ExecutionDecision::Rejected(message) => Ok(ExecutionResult::denied(message)),
        }
    }

    async fn request_completion(
        &mut self,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, AgentError> {
        let flattened;
        let outgoing: &[Message] = if self.degraded_history {
            flattened = flatten_history(&self.messages);
            &flattened
        } else {
            &self.messages
        };

        let result = self
            .retry
            .run(|| self.provider.chat_with_tools(outgoing, tools))
            .await;

        match result {
            Err(LlmError::ToolHistoryRejected { detail }) if !self.degraded_history => {
                tracing::warn!(
                    "provider rejected structured tool history ({detail}); resending as plain text"
                );
                self.degraded_history = true;
                let flat = flatten_history(&self.messages);
                Ok(self
                    .retry
                    .run(|| self.provider.chat_with_tools(&flat, tools))
                    .await?)
            }
            other => Ok(other?),
        }
    }

    async fn handle_slash_command(&mut self, line: &str) -> Result<(), AgentError> {
        let mut split = line.splitn(2, char::is_whitespace);
        let command = split.next().unwrap_or("");
        let arg = split.next().map(str::trim).unwrap_or("");

        match command {
            "/help" => self.channel.send(HELP_TEXT).await?,
            "/clear" => {
                self.messages = vec![Message::text(Role::System, &self.system_prompt)];
                self.try_save().await;
                self.channel.send("Conversation history cleared.").await?;
            }
            "/chat" => {
                if arg.is_empty() {
                    self.channel.send("Usage: /chat <name>").await?;
                    return Ok(());
                }
                self.try_save().await;
                match self.load_chat(arg).await {
                    Ok(()) => {
                        self.channel
                            .send(&format!("Switched to chat '{arg}'."))
                            .await?;
                    }
                    Err(AgentError::Store(StoreError::InvalidName(_))) => {
                        self.channel
                            .send(&format!(
                                "Invalid chat name '{arg}'. Use letters, digits, '-' and '_'."
                            ))
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
            }
            "/chats" => {
                let mut names = self.store.list().await?;
                for required in [DEFAULT_CHAT, self.chat_name.as_str()] {
                    if !names.iter().any(|n| n == required) {
                        names.push(required.to_owned());
                    }
                }
                names.sort();
                let listing: Vec<String> = names
                    .iter()
                    .map(|name| {
                        if *name == self.chat_name {
                            format!("* {name}")
                        } else {
                            format!("  {name}")
                        }
                    })
                    .collect();
                self.channel.send(&listing.join("\n")).await?;
            }
            "/drop" => {
                if arg.is_empty() {
                    self.channel.send("Usage: /drop <name>").await?;
                    return Ok(());
                }
                match self.store.delete(arg).await {
                    Ok(()) => {
                        if arg == self.chat_name {
                            self.load_chat(DEFAULT_CHAT).await?;
                        }
                        self.channel.send(&format!("Dropped chat '{arg}'.")).await?;
                    }
                    Err(StoreError::Protected(_)) => {
                        self.channel
                            .send("The default chat cannot be dropped.")
                            .await?;
                    }
                    Err(StoreError::InvalidName(_)) => {
                        self.channel
                            .send(&format!("Invalid chat name '{arg}'."))
                            .await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            other => {
                self.channel
                    .send(&format!("Unknown command: {other}. Try /help."))
                    .await?;
            }
        }
        Ok(())
    }
}

fn result_part(request: &ToolUseRequest, result: &ExecutionResult) -> MessagePart {
    MessagePart::ToolResult {
        tool_use_id: request.id.clone(),
        content: result.to_json(),
        is_error: result.is_error(),
    }
}

fn tool_definitions() -> Vec<ToolDefinition> {
    let def = terminal_command_tool();
    vec![ToolDefinition {
        name: def.id.to_owned(),
        description: def.description.to_owned(),
        parameters: def.parameters(),
    }]
}

async fn shutdown_signal(rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
