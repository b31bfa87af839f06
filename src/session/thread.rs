//! Local thread-id persistence
//!
//! The active thread id rides on every request and is swapped wholesale on
//! "new chat" or "resume session". It lives in a single file under the
//! user's data directory so the next launch picks up the same thread.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use uuid::Uuid;

use crate::error::{DatachatError, Result};

/// File-backed store for the active thread id.
pub struct ThreadStore {
    path: PathBuf,
}

impl ThreadStore {
    /// Open the store at its default location.
    ///
    /// The path can be overridden with the `DATACHAT_THREAD_FILE`
    /// environment variable, which makes it easy to point the binary at a
    /// test file without touching the user's data directory.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("DATACHAT_THREAD_FILE") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "xbcsmith", "datachat").ok_or_else(|| {
            DatachatError::ThreadStore("could not determine data directory".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| DatachatError::ThreadStore(format!("create data dir: {}", e)))?;

        Ok(Self {
            path: data_dir.join("thread_id"),
        })
    }

    /// Open the store at an explicit path (primarily for tests).
    pub fn new_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatachatError::ThreadStore(format!("create parent dir: {}", e)))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted thread id, if one exists.
    pub fn load(&self) -> Option<String> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let id = contents.trim().to_string();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    /// Persist `thread_id` as the active thread.
    pub fn store(&self, thread_id: &str) -> Result<()> {
        std::fs::write(&self.path, thread_id)
            .map_err(|e| DatachatError::ThreadStore(format!("write thread id: {}", e)))?;
        Ok(())
    }

    /// Mint a fresh thread id, persist it, and return it.
    pub fn mint(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store(&id)?;
        Ok(id)
    }

    /// The persisted thread id, minting one if none exists yet.
    pub fn load_or_mint(&self) -> Result<String> {
        match self.load() {
            Some(id) => Ok(id),
            None => self.mint(),
        }
    }
}
