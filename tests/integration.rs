//! End-to-end turns over a scripted model, a scripted operator, and the
//! real shell executor.

use std::time::Duration;

use steward_core::agent::Agent;
use steward_core::classifier::CommandClassifier;
use steward_core::gate::ApprovalGate;
use steward_core::mock::ScriptedChannel;
use steward_core::store::{ChatStore, DEFAULT_CHAT, JsonChatStore, MemoryChatStore};
use steward_llm::mock::{MockProvider, MockReply};
use steward_llm::provider::{Message, MessagePart, Role};
use steward_llm::retry::RetryPolicy;
use steward_tools::shell::ShellExecutor;

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), 2.0)
}

fn make_agent<S: ChatStore>(
    provider: &MockProvider,
    verdicts: &[(bool, &str)],
    channel: &ScriptedChannel,
    store: S,
    shell: ShellExecutor,
) -> Agent<MockProvider, MockProvider, ScriptedChannel, S> {
    let gate = ApprovalGate::new(CommandClassifier::new(
        MockProvider::with_verdicts(verdicts),
        fast_retry(),
    ));
    Agent::new(
        provider.clone(),
        gate,
        shell,
        channel.clone(),
        store,
        "You are a test assistant.",
    )
    .with_retry_policy(fast_retry())
}

fn tool_results(messages: &[Message]) -> Vec<(String, String, bool)> {
    messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .filter_map(|p| match p {
            MessagePart::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
#[cfg(unix)]
async fn read_only_listing_runs_without_approval() {
    let channel = ScriptedChannel::default();
    let provider = MockProvider::with_replies(vec![
        MockReply::tool_call("call_1", "run_terminal_command", r#"{"command":"ls -la"}"#),
        MockReply::Text("Those are your files.".into()),
    ]);
    let mut agent = make_agent(
        &provider,
        &[(false, "Lists directory contents including hidden files")],
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::default(),
    );

    agent.run_turn("what's in this directory?").await.unwrap();

    assert!(channel.prompts_shown().is_empty(), "reads must not prompt");
    let results = tool_results(agent.messages());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "call_1");
    assert!(results[0].1.contains(r#""returncode":0"#));
    assert!(!results[0].2);
    assert!(channel.sent().iter().any(|s| s == "Those are your files."));
}

#[tokio::test]
async fn denied_deletion_feeds_reason_back_to_the_model() {
    let channel = ScriptedChannel::default().with_prompt_replies(["d", "not yet"]);
    let provider = MockProvider::with_replies(vec![
        MockReply::tool_call(
            "call_1",
            "run_terminal_command",
            r#"{"command":"rm file.txt"}"#,
        ),
        MockReply::Text("Understood, I'll leave it alone.".into()),
    ]);
    let mut agent = make_agent(
        &provider,
        &[(true, "Deletes file.txt")],
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::default(),
    );

    agent.run_turn("delete file.txt").await.unwrap();

    let results = tool_results(agent.messages());
    assert_eq!(
        results[0].1,
        r#"{"error":"Command denied by user. Reason: not yet. Please try a different approach based on this feedback.","denied":true}"#
    );
    assert!(results[0].2);
    // Denial is not a dead end: the model saw the result and answered.
    assert_eq!(
        agent.messages().last().unwrap().content,
        "Understood, I'll leave it alone."
    );
}

#[tokio::test]
#[cfg(unix)]
async fn edit_to_read_only_executes_without_further_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("file.txt");
    std::fs::write(&file, "secret contents\n").unwrap();
    let cat = format!("cat {}", file.display());

    let channel = ScriptedChannel::default().with_prompt_replies(["e", cat.as_str()]);
    let provider = MockProvider::with_replies(vec![
        MockReply::tool_call(
            "call_1",
            "run_terminal_command",
            r#"{"command":"rm file.txt"}"#,
        ),
        MockReply::Text("Here's the file instead.".into()),
    ]);
    let mut agent = make_agent(
        &provider,
        &[(true, "Deletes file.txt"), (false, "Reads file.txt")],
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::default(),
    );

    agent.run_turn("get rid of file.txt").await.unwrap();

    // Approval menu + edit prompt only; the read-only edit auto-proceeds.
    assert_eq!(channel.prompts_shown().len(), 2);
    let results = tool_results(agent.messages());
    assert!(results[0].1.contains("secret contents"));
    assert!(!results[0].2);
}

#[tokio::test]
#[cfg(unix)]
async fn overlong_command_times_out_with_no_partial_output() {
    let channel = ScriptedChannel::default();
    let provider = MockProvider::with_replies(vec![
        MockReply::tool_call(
            "call_1",
            "run_terminal_command",
            r#"{"command":"echo partial && sleep 30"}"#,
        ),
        MockReply::Text("That took too long.".into()),
    ]);
    let mut agent = make_agent(
        &provider,
        &[(false, "Prints and waits")],
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::new(Duration::from_secs(1)),
    );

    agent.run_turn("wait a while").await.unwrap();

    let results = tool_results(agent.messages());
    assert_eq!(
        results[0].1,
        r#"{"error":"Command timed out after 1 seconds"}"#
    );
    assert!(!results[0].1.contains("partial"));
}

#[tokio::test]
async fn history_survives_a_session_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let channel = ScriptedChannel::default();
        let provider =
            MockProvider::with_replies(vec![MockReply::Text("noted: the word is zebra".into())]);
        let mut agent = make_agent(
            &provider,
            &[],
            &channel,
            JsonChatStore::new(dir.path()),
            ShellExecutor::default(),
        );
        agent.load_chat(DEFAULT_CHAT).await.unwrap();
        agent.run_turn("remember the word zebra").await.unwrap();
        agent.save_chat().await.unwrap();
    }

    let channel = ScriptedChannel::default();
    let provider = MockProvider::with_replies(vec![MockReply::Text("the word is zebra".into())]);
    let mut agent = make_agent(
        &provider,
        &[],
        &channel,
        JsonChatStore::new(dir.path()),
        ShellExecutor::default(),
    );
    agent.load_chat(DEFAULT_CHAT).await.unwrap();
    assert!(
        agent
            .messages()
            .iter()
            .any(|m| m.content.contains("remember the word zebra"))
    );
    assert_eq!(agent.messages()[0].role, Role::System);

    agent.run_turn("what was the word?").await.unwrap();

    // The model received the restored history in its request.
    let requests = provider.requests.lock().unwrap();
    assert!(
        requests[0]
            .iter()
            .any(|m| m.content.contains("noted: the word is zebra"))
    );
}

#[tokio::test]
async fn repl_session_answers_and_lists_chats() {
    let channel = ScriptedChannel::default().with_inputs(["hi there", "/chats"]);
    let provider = MockProvider::with_replies(vec![MockReply::Text("hello!".into())]);
    let mut agent = make_agent(
        &provider,
        &[],
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::default(),
    );

    agent.run().await.unwrap();

    let sent = channel.sent();
    assert!(sent.iter().any(|s| s == "hello!"));
    assert!(sent.iter().any(|s| s.contains("* default")));
}

#[tokio::test]
#[cfg(unix)]
async fn tool_only_model_is_bounded_end_to_end() {
    let channel = ScriptedChannel::default();
    let replies: Vec<MockReply> = (0..10)
        .map(|i| {
            MockReply::tool_call(
                &format!("call_{i}"),
                "run_terminal_command",
                r#"{"command":"echo again"}"#,
            )
        })
        .collect();
    let verdicts: Vec<(bool, &str)> = (0..10).map(|_| (false, "Prints text")).collect();
    let provider = MockProvider::with_replies(replies);
    let mut agent = make_agent(
        &provider,
        &verdicts,
        &channel,
        MemoryChatStore::default(),
        ShellExecutor::default(),
    )
    .with_max_tool_iterations(3);

    agent.run_turn("keep going").await.unwrap();

    assert!(
        channel
            .sent()
            .iter()
            .any(|s| s.contains("tool iteration limit"))
    );
    assert_eq!(tool_results(agent.messages()).len(), 3);
}
