//! Test-only scripted channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::channel::{Channel, ChannelError, ChannelMessage};

/// Channel with queued operator input and recorded output. Clones share
/// state, so tests keep a handle for assertions after the agent takes
/// ownership.
#[derive(Clone, Debug, Default)]
pub struct ScriptedChannel {
    inputs: Arc<Mutex<VecDeque<String>>>,
    prompt_replies: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    prompts_shown: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    /// Utterances returned by `recv`, in order; `None` afterwards.
    #[must_use]
    pub fn with_inputs<I, S>(self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs
            .lock()
            .unwrap()
            .extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Replies returned by `prompt`, in order; running out is an error so a
    /// test fails loudly when the gate prompts more than scripted.
    #[must_use]
    pub fn with_prompt_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt_replies
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn prompts_shown(&self) -> Vec<String> {
        self.prompts_shown.lock().unwrap().clone()
    }
}

impl Channel for ScriptedChannel {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        Ok(self
            .inputs
            .lock()
            .unwrap()
            .pop_front()
            .map(|text| ChannelMessage { text }))
    }

    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(text.to_owned());
        Ok(())
    }

    async fn prompt(&mut self, prompt: &str) -> Result<String, ChannelError> {
        self.prompts_shown.lock().unwrap().push(prompt.to_owned());
        self.prompt_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChannelError::Other(format!("no scripted reply for prompt: {prompt}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inputs_drain_in_order_then_none() {
        let mut ch = ScriptedChannel::default().with_inputs(["one", "two"]);
        assert_eq!(ch.recv().await.unwrap().unwrap().text, "one");
        assert_eq!(ch.recv().await.unwrap().unwrap().text, "two");
        assert!(ch.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clones_share_recorded_output() {
        let handle = ScriptedChannel::default().with_prompt_replies(["a"]);
        let mut ch = handle.clone();
        ch.send("hello").await.unwrap();
        let reply = ch.prompt("choose: ").await.unwrap();
        assert_eq!(reply, "a");
        assert_eq!(handle.sent(), vec!["hello".to_owned()]);
        assert_eq!(handle.prompts_shown(), vec!["choose: ".to_owned()]);
    }

    #[tokio::test]
    async fn exhausted_prompt_replies_error() {
        let mut ch = ScriptedChannel::default();
        assert!(ch.prompt("? ").await.is_err());
    }
}
