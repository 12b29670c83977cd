//! Session persistence
//!
//! A session maps to its latest tree plus the history of finished phases.
//! [`MemorySessionStore`] keeps everything in a `DashMap`;
//! [`FileSessionStore`] writes one JSON document per session.

use crate::error::StoreError;
use crate::types::PhaseRecord;
use async_trait::async_trait;
use capmap_tree::Tree;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Durable `session_id -> (tree, history)` mapping
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Latest tree of the session, `None` if never saved
    async fn load(&self, session_id: &str) -> Result<Option<Tree>, StoreError>;

    /// Replace the session's tree
    async fn save(&self, session_id: &str, tree: &Tree) -> Result<(), StoreError>;

    /// Append one finished phase to the session's history
    async fn append_history(&self, session_id: &str, record: PhaseRecord) -> Result<(), StoreError>;

    /// Every recorded phase, oldest first
    async fn history(&self, session_id: &str) -> Result<Vec<PhaseRecord>, StoreError>;
}

/// What one session persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub tree: Option<Tree>,
    #[serde(default)]
    pub history: Vec<PhaseRecord>,
}

fn check_tree(session_id: &str, tree: Option<Tree>) -> Result<Option<Tree>, StoreError> {
    if let Some(tree) = &tree {
        tree.verify_integrity().map_err(|source| StoreError::Corrupt {
            session: session_id.to_string(),
            source,
        })?;
    }
    Ok(tree)
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionDocument>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored session ids, sorted
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Tree>, StoreError> {
        Ok(self.sessions.get(session_id).and_then(|doc| doc.tree.clone()))
    }

    async fn save(&self, session_id: &str, tree: &Tree) -> Result<(), StoreError> {
        self.sessions.entry(session_id.to_string()).or_default().tree = Some(tree.clone());
        Ok(())
    }

    async fn append_history(&self, session_id: &str, record: PhaseRecord) -> Result<(), StoreError> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .history
            .push(record);
        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<PhaseRecord>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|doc| doc.history.clone())
            .unwrap_or_default())
    }
}

/// One `<session_id>.json` per session under a directory
///
/// Writes go to a temporary file renamed over the previous document.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `root`; the directory is created on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !session_id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidSessionId(session_id.to_string()));
        }
        Ok(self.root.join(format!("{session_id}.json")))
    }

    async fn read(&self, session_id: &str) -> Result<SessionDocument, StoreError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, session_id: &str, doc: &SessionDocument) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("Saved session {} to {}", session_id, path.display());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Tree>, StoreError> {
        let doc = self.read(session_id).await?;
        check_tree(session_id, doc.tree)
    }

    async fn save(&self, session_id: &str, tree: &Tree) -> Result<(), StoreError> {
        let mut doc = self.read(session_id).await?;
        doc.tree = Some(tree.clone());
        self.write(session_id, &doc).await
    }

    async fn append_history(&self, session_id: &str, record: PhaseRecord) -> Result<(), StoreError> {
        let mut doc = self.read(session_id).await?;
        doc.history.push(record);
        self.write(session_id, &doc).await
    }

    async fn history(&self, session_id: &str) -> Result<Vec<PhaseRecord>, StoreError> {
        Ok(self.read(session_id).await?.history)
    }
}
