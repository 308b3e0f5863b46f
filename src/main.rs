mod cli;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use steward_core::agent::Agent;
use steward_core::classifier::CommandClassifier;
use steward_core::config::Config;
use steward_core::gate::ApprovalGate;
use steward_core::store::{DEFAULT_CHAT, JsonChatStore};
use steward_llm::compatible::CompatibleProvider;
use steward_tools::shell::ShellExecutor;

#[derive(Parser, Debug)]
#[command(
    name = "steward",
    version,
    about = "Terminal AI assistant that runs shell commands behind a human approval gate"
)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Chat to open at startup.
    #[arg(long)]
    chat: Option<String>,

    /// Override the conversational model.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    config.validate()?;

    let api_key = config
        .secrets
        .api_key
        .as_ref()
        .context(
            "no API key found; set STEWARD_API_KEY or OPENROUTER_API_KEY \
             (keys: https://openrouter.ai/keys)",
        )?
        .expose()
        .to_owned();

    let provider = CompatibleProvider::new(
        "openrouter".into(),
        api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        config.llm.reasoning_effort.clone(),
    );
    // The classifier gets its own provider: a separate model and a more
    // careful reasoning setting, since a false negative executes a
    // system-modifying command without review.
    let classifier_provider = CompatibleProvider::new(
        "openrouter".into(),
        api_key,
        config.llm.base_url.clone(),
        config.llm.classifier_model.clone(),
        config.llm.max_tokens,
        config.llm.classifier_reasoning_effort.clone(),
    );

    let retry = config.retry.policy();
    let gate = ApprovalGate::new(CommandClassifier::new(classifier_provider, retry.clone()));
    let shell = ShellExecutor::new(config.shell.timeout());
    let store = JsonChatStore::new(chats_dir(&config));
    let channel = cli::CliChannel::new(config.agent.name.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received interrupt");
        let _ = shutdown_tx.send(true);
    });

    let mut agent = Agent::new(provider, gate, shell, channel, store, config.system_prompt())
        .with_max_tool_iterations(config.agent.max_tool_iterations)
        .with_retry_policy(retry)
        .with_shutdown(shutdown_rx);

    let initial_chat = args.chat.as_deref().unwrap_or(DEFAULT_CHAT);
    agent
        .load_chat(initial_chat)
        .await
        .with_context(|| format!("failed to open chat '{initial_chat}'"))?;

    println!("steward v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Ask for anything. Read-only commands run immediately; commands that modify the \
         system will ask for your approval. /help lists commands."
    );

    agent.run().await?;
    println!("Bye.");
    Ok(())
}

fn chats_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.agent.chats_dir {
        return dir.clone();
    }
    dirs::data_dir().map_or_else(
        || PathBuf::from(".steward/chats"),
        |d| d.join("steward").join("chats"),
    )
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
