use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use steward_llm::RetryPolicy;

/// API key holder that never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub shell: ShellConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub name: String,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
    pub max_tool_iterations: usize,
    pub chats_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Steward".into(),
            system_prompt: None,
            max_tool_iterations: 10,
            chats_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Model used for command safety classification. Misclassification is a
    /// security-relevant error, so this defaults to a careful configuration
    /// rather than the conversational model's.
    pub classifier_model: String,
    pub reasoning_effort: Option<String>,
    pub classifier_reasoning_effort: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "openai/gpt-4o".into(),
            classifier_model: "openai/gpt-4o-mini".into(),
            reasoning_effort: None,
            classifier_reasoning_effort: Some("high".into()),
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl ShellConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub api_key: Option<Secret>,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("STEWARD_MODEL")
            && !model.is_empty()
        {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("STEWARD_BASE_URL")
            && !url.is_empty()
        {
            self.llm.base_url = url;
        }
        let key = std::env::var("STEWARD_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());
        if let Some(key) = key {
            self.secrets.api_key = Some(Secret::new(key));
        }
    }

    /// # Errors
    ///
    /// Returns an error when a value would make the agent inoperable.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.llm.base_url.is_empty(), "llm.base_url must be set");
        anyhow::ensure!(!self.llm.model.is_empty(), "llm.model must be set");
        anyhow::ensure!(
            !self.llm.classifier_model.is_empty(),
            "llm.classifier_model must be set"
        );
        anyhow::ensure!(
            self.agent.max_tool_iterations >= 1,
            "agent.max_tool_iterations must be at least 1"
        );
        anyhow::ensure!(self.shell.timeout_secs >= 1, "shell.timeout_secs must be at least 1");
        Ok(())
    }

    /// The system prompt for the conversational model.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        if let Some(ref prompt) = self.agent.system_prompt {
            return prompt.clone();
        }
        format!(
            "You are {name}, an AI assistant that lives in the user's terminal. Beyond \
             answering questions, you can run terminal commands on the user's machine through \
             the run_terminal_command tool whenever a request calls for it. Commands are \
             reviewed automatically: read-only commands execute immediately, while commands \
             that modify the system prompt the operator for approval before execution. Do not \
             ask for permission yourself; the review happens out of band, so focus on \
             fulfilling the request. If the operator denies a command, acknowledge it \
             gracefully and adapt your next attempt to any reason they gave.",
            name = self.agent.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "STEWARD_MODEL",
            "STEWARD_BASE_URL",
            "STEWARD_API_KEY",
            "OPENROUTER_API_KEY",
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn missing_file_uses_defaults() {
        clear_env();
        let config = Config::load(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(config.agent.name, "Steward");
        assert_eq!(config.agent.max_tool_iterations, 10);
        assert_eq!(config.llm.classifier_model, "openai/gpt-4o-mini");
        assert_eq!(
            config.llm.classifier_reasoning_effort.as_deref(),
            Some("high")
        );
        assert_eq!(config.shell.timeout_secs, 60);
        assert!(config.secrets.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn toml_values_override_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
name = "Butler"
max_tool_iterations = 4

[llm]
model = "openai/gpt-4o-mini"

[shell]
timeout_secs = 30
"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.agent.name, "Butler");
        assert_eq!(config.agent.max_tool_iterations, 4);
        assert_eq!(config.llm.model, "openai/gpt-4o-mini");
        assert_eq!(config.shell.timeout_secs, 30);
        // Untouched sections keep their defaults.
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    #[serial]
    fn unknown_keys_are_rejected() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nnmae = \"typo\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_model_and_key() {
        clear_env();
        unsafe {
            std::env::set_var("STEWARD_MODEL", "anthropic/claude-sonnet");
            std::env::set_var("OPENROUTER_API_KEY", "sk-or-test");
        }
        let config = Config::load(Path::new("/does/not/exist.toml")).unwrap();
        clear_env();
        assert_eq!(config.llm.model, "anthropic/claude-sonnet");
        assert_eq!(
            config.secrets.api_key.as_ref().map(Secret::expose),
            Some("sk-or-test")
        );
    }

    #[test]
    #[serial]
    fn steward_key_takes_precedence() {
        clear_env();
        unsafe {
            std::env::set_var("STEWARD_API_KEY", "sk-steward");
            std::env::set_var("OPENROUTER_API_KEY", "sk-openrouter");
        }
        let config = Config::load(Path::new("/does/not/exist.toml")).unwrap();
        clear_env();
        assert_eq!(
            config.secrets.api_key.as_ref().map(Secret::expose),
            Some("sk-steward")
        );
    }

    #[test]
    fn validate_rejects_zero_iterations() {
        let mut config = Config::default();
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_model() {
        let mut config = Config::default();
        config.llm.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("sk-very-private");
        let debug = format!("{secret:?}");
        assert!(!debug.contains("sk-very-private"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn system_prompt_uses_agent_name() {
        let mut config = Config::default();
        config.agent.name = "Butler".into();
        let prompt = config.system_prompt();
        assert!(prompt.starts_with("You are Butler"));
        assert!(prompt.contains("run_terminal_command"));
        assert!(prompt.contains("Do not ask for permission"));
    }

    #[test]
    fn explicit_system_prompt_wins() {
        let mut config = Config::default();
        config.agent.system_prompt = Some("custom prompt".into());
        assert_eq!(config.system_prompt(), "custom prompt");
    }

    #[test]
    fn retry_config_builds_policy() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 250,
            backoff_factor: 3.0,
        };
        let policy = config.policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
    }

    #[test]
    fn shell_timeout_conversion() {
        let config = ShellConfig { timeout_secs: 5 };
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
