//! Chat transcript storage.
//!
//! Defines the [`SessionStore`] trait plus [`MemorySessionStore`] for tests
//! and [`FsSessionStore`], which keeps one JSON file per session with atomic
//! writes. Messages are only ever replaced as a whole list; last writer wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::llm::{ChatMessage, ChatRole};
use crate::storage::write_atomic;

/// Title used until the first user message arrives.
pub const DEFAULT_TITLE: &str = "New chat";

const TITLE_CHARS: usize = 40;

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        let now = Utc::now();
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_owned(),
            messages,
            created_at: now,
            updated_at: now,
        };
        session.seed_title();
        session
    }

    fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.updated_at = Utc::now();
        self.seed_title();
    }

    fn seed_title(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        if let Some(first) = self
            .messages
            .iter()
            .find(|m| m.role == ChatRole::User && !m.content.trim().is_empty())
        {
            self.title = title_from(&first.content);
        }
    }
}

/// Session title from a first message: trimmed, 40 characters, ellipsis.
pub fn title_from(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(TITLE_CHARS) {
        None => text.to_owned(),
        Some((end, _)) => format!("{}…", text[..end].trim_end()),
    }
}

/// Async transcript storage backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions, most recently updated first.
    async fn list(&self) -> Result<Vec<ChatSession>>;

    /// One session, or `None` if the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<ChatSession>>;

    /// Create a session seeded with `messages`.
    async fn create(&self, messages: Vec<ChatMessage>) -> Result<ChatSession>;

    /// Overwrite a session's messages.
    ///
    /// Returns [`AssistantError::Session`] for an unknown id.
    async fn replace_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<ChatSession>;

    /// Delete a session and its messages. Unknown ids are not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every session.
    async fn clear_all(&self) -> Result<()>;
}

fn unknown(id: &str) -> AssistantError {
    AssistantError::Session(format!("unknown session: {id}"))
}

fn newest_first(sessions: &mut [ChatSession]) {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// In-memory session store for tests and ephemeral use.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ChatSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn list(&self) -> Result<Vec<ChatSession>> {
        let mut all: Vec<_> = self.sessions.read().await.values().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn create(&self, messages: Vec<ChatMessage>) -> Result<ChatSession> {
        let session = ChatSession::new(messages);
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn replace_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<ChatSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| unknown(id))?;
        session.replace(messages);
        Ok(session.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.sessions.write().await.clear();
        Ok(())
    }
}

/// Filesystem-backed session store: `{dir}/{id}.json`.
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    dir: PathBuf,
}

impl FsSessionStore {
    /// Create the store, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Session`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AssistantError::Session(format!(
                "failed to create session directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids become file names.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(unknown(id));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn read(path: &Path) -> Result<ChatSession> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Session(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AssistantError::Session(format!("failed to parse {}: {e}", path.display()))
        })
    }

    fn write(&self, session: &ChatSession) -> Result<()> {
        let path = self.path_for(&session.id)?;
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| AssistantError::Session(format!("failed to serialize session: {e}")))?;
        write_atomic(&path, &json).map_err(|e| {
            AssistantError::Session(format!("failed to write {}: {e}", path.display()))
        })
    }

    fn session_files(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            AssistantError::Session(format!(
                "failed to read session directory {}: {e}",
                self.dir.display()
            ))
        })?;
        Ok(entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter(|p| {
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn list(&self) -> Result<Vec<ChatSession>> {
        let mut all = Vec::new();
        for path in self.session_files()? {
            match Self::read(&path) {
                Ok(session) => all.push(session),
                Err(e) => warn!(error = %e, "skipping unreadable session file"),
            }
        }
        newest_first(&mut all);
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>> {
        let Ok(path) = self.path_for(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    async fn create(&self, messages: Vec<ChatMessage>) -> Result<ChatSession> {
        let session = ChatSession::new(messages);
        self.write(&session)?;
        debug!(id = %session.id, "session created");
        Ok(session)
    }

    async fn replace_messages(&self, id: &str, messages: Vec<ChatMessage>) -> Result<ChatSession> {
        let mut session = self.get(id).await?.ok_or_else(|| unknown(id))?;
        session.replace(messages);
        self.write(&session)?;
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let Ok(path) = self.path_for(id) else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssistantError::Session(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        for path in self.session_files()? {
            std::fs::remove_file(&path).map_err(|e| {
                AssistantError::Session(format!("failed to delete {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn title_is_truncated_with_ellipsis() {
        assert_eq!(title_from("  Short question  "), "Short question");
        let long = "Can you tell me how to configure my router for port forwarding please";
        let title = title_from(long);
        assert!(title.ends_with('…'));
        assert!(title.chars().count() <= 41);
        assert!(long.starts_with(title.trim_end_matches('…')));
    }

    #[test]
    fn title_seeded_from_first_user_message_only() {
        let mut session = ChatSession::new(vec![ChatMessage::assistant("Hi!")]);
        assert_eq!(session.title, DEFAULT_TITLE);
        session.replace(vec![
            ChatMessage::assistant("Hi!"),
            ChatMessage::user("Open calculator"),
        ]);
        assert_eq!(session.title, "Open calculator");
        session.replace(vec![ChatMessage::user("Something else")]);
        assert_eq!(session.title, "Open calculator");
    }

    async fn exercise(store: &dyn SessionStore) {
        let a = store.create(vec![ChatMessage::assistant("hello")]).await.unwrap();
        let b = store.create(vec![]).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        let updated = store
            .replace_messages(
                &a.id,
                vec![ChatMessage::assistant("hello"), ChatMessage::user("what's up")],
            )
            .await
            .unwrap();
        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.title, "what's up");
        assert!(updated.updated_at >= a.updated_at);

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, a.id, "most recently updated first");

        assert!(store.get("missing").await.unwrap().is_none());
        assert!(matches!(
            store.replace_messages("missing", vec![]).await,
            Err(AssistantError::Session(_))
        ));

        store.delete(&b.id).await.unwrap();
        store.delete(&b.id).await.unwrap();
        assert!(store.get(&b.id).await.unwrap().is_none());

        store.clear_all().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_crud() {
        exercise(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn fs_store_crud() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsSessionStore::new(dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn fs_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FsSessionStore::new(dir.path()).unwrap();
            store
                .create(vec![ChatMessage::user("remember me")])
                .await
                .unwrap()
                .id
        };
        let store = FsSessionStore::new(dir.path()).unwrap();
        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages, vec![ChatMessage::user("remember me")]);
    }

    #[tokio::test]
    async fn fs_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path()).unwrap();
        assert!(store.get("../etc/passwd").await.unwrap().is_none());
        assert!(store.delete("../x").await.is_ok());
    }

    #[tokio::test]
    async fn fs_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path()).unwrap();
        store.create(vec![]).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "nope").unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
