//! Cursor stores
//!
//! `FileCursorStore` keeps every key of a deployment in one JSON file,
//! written atomically after each update. The cached state only changes once
//! the file write succeeded.

use super::types::{Cursor, CursorEntry, CursorFile};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Key-value store of last-seen positions
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Read a cursor. An absent key is registered with `default`, which is
    /// then returned.
    async fn get(&self, key: &str, default: Option<Cursor>) -> Result<Option<Cursor>>;

    /// Write a cursor
    async fn put(&self, key: &str, cursor: Cursor) -> Result<()>;

    /// List every stored key
    async fn entries(&self) -> Result<Vec<(String, CursorEntry)>>;

    /// Remove a key, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// JSON-file backed cursor store
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    /// Path to the cursor file (empty for in-memory)
    path: PathBuf,
    /// Cached file content
    state: Arc<RwLock<CursorFile>>,
}

impl FileCursorStore {
    /// Open a store, loading the file if it exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::cursor(format!("Failed to read {}: {e}", path.display())))?;
            if contents.trim().is_empty() {
                CursorFile::default()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    Error::cursor(format!("Failed to parse {}: {e}", path.display()))
                })?
            }
        } else {
            CursorFile::default()
        };

        debug!(path = %path.display(), keys = state.cursors.len(), "Opened cursor store");

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create an in-memory store (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(CursorFile::default())),
        }
    }

    /// Keep the loaded cursors but stop writing them to the file
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.path = PathBuf::new();
        self
    }

    /// Get the cursor file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Save current state to file
    async fn save(&self, state: &CursorFile) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| Error::cursor(format!("Failed to serialize cursors: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write to temp file first, then rename
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::cursor(format!("Failed to write cursor file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::cursor(format!("Failed to rename cursor file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, key: &str, default: Option<Cursor>) -> Result<Option<Cursor>> {
        {
            let state = self.state.read().await;
            if let Some(entry) = state.cursors.get(key) {
                return Ok(entry.cursor.clone());
            }
        }

        let mut state = self.state.write().await;
        if let Some(entry) = state.cursors.get(key) {
            return Ok(entry.cursor.clone());
        }

        info!(key, default = ?default, "Registering new cursor key");
        let mut next = state.clone();
        next.cursors
            .insert(key.to_string(), CursorEntry::registered(default.clone()));
        self.save(&next).await?;
        *state = next;

        Ok(default)
    }

    async fn put(&self, key: &str, cursor: Cursor) -> Result<()> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let entry = next
            .cursors
            .entry(key.to_string())
            .or_insert_with(|| CursorEntry::registered(None));
        entry.cursor = Some(cursor);
        entry.updated_at = Some(Utc::now());

        self.save(&next).await?;
        *state = next;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, CursorEntry)>> {
        let state = self.state.read().await;
        Ok(state
            .cursors
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.cursors.contains_key(key) {
            return Ok(false);
        }

        let mut next = state.clone();
        next.cursors.remove(key);
        self.save(&next).await?;
        *state = next;
        Ok(true)
    }
}
