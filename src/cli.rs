use dialoguer::Input;
use steward_core::channel::{Channel, ChannelError, ChannelMessage};

/// Terminal channel: line input via dialoguer, plain stdout output.
#[derive(Debug)]
pub struct CliChannel {
    name: String,
}

impl CliChannel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

async fn read_line(prompt: String) -> Result<String, ChannelError> {
    tokio::task::spawn_blocking(move || {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .map_err(|e| ChannelError::Other(e.to_string()))?
    .map_err(|e| ChannelError::Other(e.to_string()))
}

impl Channel for CliChannel {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        // Interrupt or EOF on the input line ends the session.
        let Ok(line) = read_line("you".to_owned()).await else {
            return Ok(None);
        };
        let trimmed = line.trim();
        if trimmed == "exit" || trimmed == "quit" {
            return Ok(None);
        }
        Ok(Some(ChannelMessage {
            text: trimmed.to_owned(),
        }))
    }

    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        println!("{}: {text}", self.name);
        Ok(())
    }

    async fn prompt(&mut self, prompt: &str) -> Result<String, ChannelError> {
        read_line(prompt.trim_end().to_owned())
            .await
            .map_err(|_| ChannelError::Closed)
    }
}
