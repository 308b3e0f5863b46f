use serde::Deserialize;
use steward_llm::provider::{LlmProvider, Message, Role};
use steward_llm::retry::RetryPolicy;
use steward_llm::{LlmError, extract};

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a command safety analyzer. Decide whether a shell command will modify the \
     system (write, delete, install, update, change permissions, send data over the network, \
     etc.) or only read information.\n\
     Respond with a JSON object in exactly this format:\n\
     {\n\
       \"modifies\": true/false,\n\
       \"description\": \"Brief description of what the command does\"\n\
     }\n\
     Commands that MODIFY include: write operations, file creation or deletion, package \
     installation, updates, permission changes, network operations that send data.\n\
     Commands that are READ-ONLY include: listing files, reading file contents, checking \
     status, viewing information.";

/// Safety verdict for one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVerdict {
    pub modifies: bool,
    pub description: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    modifies: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Asks a dedicated model whether a command would mutate system state.
///
/// Verdicts are produced fresh for every command string, edited
/// resubmissions included, and every failure path is fail-closed: a
/// command the classifier cannot judge is treated as modifying.
#[derive(Debug)]
pub struct CommandClassifier<P> {
    provider: P,
    retry: RetryPolicy,
}

impl<P: LlmProvider> CommandClassifier<P> {
    #[must_use]
    pub fn new(provider: P, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub async fn classify(&self, command: &str) -> CommandVerdict {
        match self.try_classify(command).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("command classification failed, treating as modifying: {e}");
                CommandVerdict {
                    modifies: true,
                    description: format!(
                        "Unable to analyze command (error: {e}). Treating it as potentially modifying."
                    ),
                }
            }
        }
    }

    async fn try_classify(&self, command: &str) -> Result<CommandVerdict, LlmError> {
        let messages = vec![
            Message::text(Role::System, CLASSIFIER_SYSTEM_PROMPT),
            Message::text(Role::User, format!("Analyze this command: {command}")),
        ];

        let response = self.retry.run(|| self.provider.chat(&messages)).await?;
        let raw: RawVerdict =
            extract::json_from_response(&response).map_err(LlmError::Json)?;

        Ok(CommandVerdict {
            modifies: raw.modifies,
            description: raw
                .description
                .unwrap_or_else(|| "No description available".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use steward_llm::mock::{MockProvider, MockReply};

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2.0)
    }

    fn classifier(provider: MockProvider) -> CommandClassifier<MockProvider> {
        CommandClassifier::new(provider, fast_retry())
    }

    #[tokio::test]
    async fn read_only_verdict_parsed() {
        let c = classifier(MockProvider::with_verdicts(&[(
            false,
            "Lists directory contents",
        )]));
        let verdict = c.classify("ls -la").await;
        assert!(!verdict.modifies);
        assert_eq!(verdict.description, "Lists directory contents");
    }

    #[tokio::test]
    async fn modifying_verdict_parsed() {
        let c = classifier(MockProvider::with_verdicts(&[(true, "Deletes file.txt")]));
        let verdict = c.classify("rm file.txt").await;
        assert!(verdict.modifies);
        assert_eq!(verdict.description, "Deletes file.txt");
    }

    #[tokio::test]
    async fn fenced_reply_accepted() {
        let c = classifier(MockProvider::with_replies(vec![MockReply::Text(
            "```json\n{\"modifies\": false, \"description\": \"shows date\"}\n```".into(),
        )]));
        let verdict = c.classify("date").await;
        assert!(!verdict.modifies);
    }

    #[tokio::test]
    async fn provider_failure_fails_closed() {
        let c = classifier(MockProvider::with_replies(vec![
            MockReply::Error("connection refused".into()),
            MockReply::Error("connection refused".into()),
            MockReply::Error("connection refused".into()),
        ]));
        let verdict = c.classify("ls").await;
        assert!(verdict.modifies);
        assert!(verdict.description.contains("Unable to analyze command"));
    }

    #[tokio::test]
    async fn malformed_reply_fails_closed() {
        let c = classifier(MockProvider::with_replies(vec![MockReply::Text(
            "that command looks safe to me!".into(),
        )]));
        let verdict = c.classify("ls").await;
        assert!(verdict.modifies);
    }

    #[tokio::test]
    async fn missing_modifies_key_fails_closed() {
        let c = classifier(MockProvider::with_replies(vec![MockReply::Text(
            r#"{"description": "lists files"}"#.into(),
        )]));
        let verdict = c.classify("ls").await;
        assert!(verdict.modifies);
    }

    #[tokio::test]
    async fn missing_description_gets_fallback_text() {
        let c = classifier(MockProvider::with_replies(vec![MockReply::Text(
            r#"{"modifies": false}"#.into(),
        )]));
        let verdict = c.classify("ls").await;
        assert!(!verdict.modifies);
        assert_eq!(verdict.description, "No description available");
    }

    #[tokio::test]
    async fn transient_rate_limit_is_retried() {
        let c = classifier(MockProvider::with_replies(vec![
            MockReply::RateLimited,
            MockReply::Text(r#"{"modifies": false, "description": "prints text"}"#.into()),
        ]));
        let verdict = c.classify("echo hi").await;
        assert!(!verdict.modifies);
    }

    #[tokio::test]
    async fn each_call_gets_a_fresh_verdict() {
        let provider = MockProvider::with_verdicts(&[
            (true, "Deletes file.txt"),
            (false, "Reads file.txt"),
        ]);
        let c = classifier(provider.clone());
        assert!(c.classify("rm file.txt").await.modifies);
        assert!(!c.classify("cat file.txt").await.modifies);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn classifier_sends_strict_system_instruction() {
        let provider = MockProvider::with_verdicts(&[(false, "x")]);
        let c = classifier(provider.clone());
        c.classify("ls").await;
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0][0].role, Role::System);
        assert!(requests[0][0].content.contains("command safety analyzer"));
        assert_eq!(requests[0][1].content, "Analyze this command: ls");
    }
}
