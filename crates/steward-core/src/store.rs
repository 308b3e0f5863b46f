#[cfg(any(test, feature = "mock"))]
use std::collections::HashMap;
use std::path::PathBuf;
#[cfg(any(test, feature = "mock"))]
use std::sync::Mutex;

use steward_llm::provider::Message;

/// The chat every session starts in. Always exists, never deletable.
pub const DEFAULT_CHAT: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid chat name: {0}")]
    InvalidName(String),

    #[error("chat '{0}' cannot be deleted")]
    Protected(String),
}

/// Persistence port for conversation history. History snapshots are opaque
/// ordered message lists; the agent never depends on file semantics.
pub trait ChatStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error on an invalid name or a failed/corrupt read.
    fn load(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Vec<Message>>, StoreError>> + Send;

    /// # Errors
    ///
    /// Returns an error on an invalid name or a failed write.
    fn save(
        &self,
        name: &str,
        messages: &[Message],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// # Errors
    ///
    /// Returns an error when the listing cannot be produced.
    fn list(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Deleting a missing chat is not an error; deleting the default chat is.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Protected` for the default chat, or an I/O error.
    fn delete(&self, name: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

/// One JSON file per chat under a directory, replaced atomically on save
/// (write to a temp file, then rename) so a crash never leaves a partial
/// snapshot.
#[derive(Debug, Clone)]
pub struct JsonChatStore {
    dir: PathBuf,
}

impl JsonChatStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl ChatStore for JsonChatStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<Message>>, StoreError> {
        validate_name(name)?;
        match tokio::fs::read_to_string(self.path_for(name)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, name: &str, messages: &[Message]) -> Result<(), StoreError> {
        validate_name(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let payload = serde_json::to_vec_pretty(messages)?;
        let final_path = self.path_for(name);
        let tmp_path = self.dir.join(format!("{name}.json.tmp"));
        tokio::fs::write(&tmp_path, payload).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        if name == DEFAULT_CHAT {
            return Err(StoreError::Protected(name.to_owned()));
        }
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    chats: Mutex<HashMap<String, Vec<Message>>>,
}

#[cfg(any(test, feature = "mock"))]
impl ChatStore for MemoryChatStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<Message>>, StoreError> {
        validate_name(name)?;
        Ok(self.chats.lock().unwrap().get(name).cloned())
    }

    async fn save(&self, name: &str, messages: &[Message]) -> Result<(), StoreError> {
        validate_name(name)?;
        self.chats
            .lock()
            .unwrap()
            .insert(name.to_owned(), messages.to_vec());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.chats.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        if name == DEFAULT_CHAT {
            return Err(StoreError::Protected(name.to_owned()));
        }
        self.chats.lock().unwrap().remove(name);
        Ok(())
    }
}
