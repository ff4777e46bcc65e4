// src/storage/cursor.rs

//! Durable pagination cursor store.
//!
//! Holds the last page cursor and the derived "more pages available" flag in
//! a small JSON file that survives restarts. All operations serialize through
//! a single-writer lock: `stop`/`reset` may be called from outside the crawl
//! loop, so save/load/reset must never interleave partially.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

/// File name of the cursor state inside the data directory.
pub const STATE_FILE: &str = "crawl_state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorState {
    cursor: Option<String>,
    has_more: bool,
}

impl Default for CursorState {
    // No saved state means the crawl starts at the beginning of the sequence.
    fn default() -> Self {
        Self {
            cursor: None,
            has_more: true,
        }
    }
}

/// File-backed cursor store guarded by a single-writer lock.
pub struct CursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CursorStore {
    /// Create a store persisting under the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Persist the cursor returned by a page fetch.
    ///
    /// `has_more` is derived from cursor presence: a terminal page persists
    /// `None` and marks the pagination exhausted.
    pub async fn save(&self, cursor: Option<&str>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let state = CursorState {
            cursor: cursor.map(str::to_string),
            has_more: cursor.is_some(),
        };
        self.write_state(&state).await
    }

    /// Load the last persisted cursor; `None` means start of sequence.
    pub async fn load(&self) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_state().await?.cursor)
    }

    /// Whether further pages exist. `false` is terminal.
    pub async fn has_more(&self) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.read_state().await?.has_more)
    }

    /// Reset to the start of the sequence: cursor absent, has_more true.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_state(&CursorState::default()).await
    }

    async fn read_state(&self) -> Result<CursorState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CursorState::default()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write atomically: temp file, fsync, rename.
    async fn write_state(&self, state: &CursorState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_store_starts_at_beginning() {
        let tmp = TempDir::new().unwrap();
        let store = CursorStore::new(tmp.path());

        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = CursorStore::new(tmp.path());

        store.save(Some("cursor-42")).await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("cursor-42"));
        assert!(store.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_page_clears_has_more() {
        let tmp = TempDir::new().unwrap();
        let store = CursorStore::new(tmp.path());

        store.save(Some("cursor-1")).await.unwrap();
        store.save(None).await.unwrap();

        assert_eq!(store.load().await.unwrap(), None);
        assert!(!store.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let tmp = TempDir::new().unwrap();
        {
            let store = CursorStore::new(tmp.path());
            store.save(Some("cursor-7")).await.unwrap();
        }

        // A new store over the same directory sees the durable copy.
        let store = CursorStore::new(tmp.path());
        assert_eq!(store.load().await.unwrap().as_deref(), Some("cursor-7"));
        assert!(store.has_more().await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_restores_start_of_sequence() {
        let tmp = TempDir::new().unwrap();
        let store = CursorStore::new(tmp.path());

        store.save(None).await.unwrap();
        assert!(!store.has_more().await.unwrap());

        store.reset().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert!(store.has_more().await.unwrap());
    }
}
