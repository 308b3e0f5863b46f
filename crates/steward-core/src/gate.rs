use steward_llm::provider::LlmProvider;

use crate::channel::{Channel, ChannelError};
use crate::classifier::CommandClassifier;

const APPROVAL_PROMPT: &str = "[A]ccept, [D]eny, or [E]dit this command? ";
const REASON_PROMPT: &str = "Why deny it? (helps the assistant adjust, leave empty to skip): ";
const EDIT_PROMPT: &str = "Enter the replacement command: ";

/// Outcome of an approval negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDecision {
    /// Execution is permitted for this exact command text.
    Proceed(String),
    /// Execution was refused; the message is fed back to the model as the
    /// tool result so it can adapt its next attempt.
    Rejected(String),
}

enum ApprovalChoice {
    Accept,
    Deny,
    Edit,
}

impl ApprovalChoice {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "a" | "accept" => Some(Self::Accept),
            "d" | "deny" => Some(Self::Deny),
            "e" | "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

/// Human-in-the-loop checkpoint in front of command execution.
///
/// Read-only verdicts pass through silently; modifying verdicts block on an
/// accept/deny/edit negotiation with the operator. An edited command always
/// re-enters classification; editing can never bypass the gate.
#[derive(Debug)]
pub struct ApprovalGate<P> {
    classifier: CommandClassifier<P>,
}

impl<P: LlmProvider> ApprovalGate<P> {
    #[must_use]
    pub fn new(classifier: CommandClassifier<P>) -> Self {
        Self { classifier }
    }

    /// Run the negotiation for `command`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the channel itself fails; every decision
    /// outcome, including denial, is a normal return value.
    pub async fn review<C: Channel>(
        &self,
        channel: &mut C,
        command: &str,
    ) -> Result<ExecutionDecision, ChannelError> {
        let mut command = command.to_owned();

        loop {
            let verdict = self.classifier.classify(&command).await;
            if !verdict.modifies {
                tracing::debug!("command classified read-only: {command}");
                return Ok(ExecutionDecision::Proceed(command));
            }

            channel
                .send(&format!(
                    "Command requires approval:\n  command: {command}\n  effect:  {}",
                    verdict.description
                ))
                .await?;

            loop {
                let input = channel.prompt(APPROVAL_PROMPT).await?;
                match ApprovalChoice::parse(&input) {
                    Some(ApprovalChoice::Accept) => {
                        return Ok(ExecutionDecision::Proceed(command));
                    }
                    Some(ApprovalChoice::Deny) => {
                        return self.deny(channel).await;
                    }
                    Some(ApprovalChoice::Edit) => {
                        let replacement = channel.prompt(EDIT_PROMPT).await?;
                        let replacement = replacement.trim();
                        if replacement.is_empty() {
                            channel.send("No command entered, denying.").await?;
                            return self.deny(channel).await;
                        }
                        command = replacement.to_owned();
                        break; // re-classify the edited command
                    }
                    None => {
                        channel
                            .send("Invalid choice. Enter A, D, or E.")
                            .await?;
                    }
                }
            }
        }
    }

    async fn deny<C: Channel>(&self, channel: &mut C) -> Result<ExecutionDecision, ChannelError> {
        let reason = channel.prompt(REASON_PROMPT).await?;
        Ok(ExecutionDecision::Rejected(denial_message(reason.trim())))
    }
}

fn denial_message(reason: &str) -> String {
    if reason.is_empty() {
        "Command denied by user. Please try a different approach.".into()
    } else {
        format!(
            "Command denied by user. Reason: {reason}. Please try a different approach based on this feedback."
        )
    }
}
