//! In-memory versioned tree adapter
//!
//! Models the staging/commit split of a real version-controlled directory:
//! staged changes are invisible to readers until commit, and the clean query
//! reflects both staged and loose (never-staged) changes. Test helpers allow
//! planting out-of-band state, the way a human with a shell could.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{TreeError, VersionedTree};

/// One committed changeset.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct TreeState {
    /// Path -> content as of the last commit.
    committed: BTreeMap<String, Vec<u8>>,
    /// Path -> staged content, `None` meaning a staged removal.
    staged: BTreeMap<String, Option<Vec<u8>>>,
    /// Loose working-tree changes outside any staging (dirty state).
    loose: BTreeMap<String, Vec<u8>>,
    commits: Vec<CommitRecord>,
}

/// Versioned tree held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryTree {
    state: RwLock<TreeState>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit history, oldest first.
    pub async fn commit_log(&self) -> Vec<CommitRecord> {
        self.state.read().await.commits.clone()
    }

    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits.len()
    }

    /// Plant a file as committed content, bypassing staging - simulates an
    /// out-of-band commit made behind the coordinator's back.
    pub async fn place_committed(&self, path: &str, content: &[u8]) {
        let mut state = self.state.write().await;
        state.committed.insert(path.to_string(), content.to_vec());
    }

    /// Plant a loose working-tree change - makes the tree dirty without
    /// staging anything.
    pub async fn place_loose(&self, path: &str, content: &[u8]) {
        let mut state = self.state.write().await;
        state.loose.insert(path.to_string(), content.to_vec());
    }

    /// Drop a committed file without a commit - simulates out-of-band loss.
    pub async fn remove_committed(&self, path: &str) {
        let mut state = self.state.write().await;
        state.committed.remove(path);
    }
}

fn commit_id(serial: usize, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serial.to_be_bytes());
    hasher.update(message.as_bytes());
    hex::encode(&hasher.finalize()[..6])
}

#[async_trait]
impl VersionedTree for MemoryTree {
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TreeError> {
        let mut state = self.state.write().await;
        state
            .staged
            .insert(path.to_string(), Some(content.to_vec()));
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), TreeError> {
        let mut state = self.state.write().await;
        let exists = state.committed.contains_key(path)
            || matches!(state.staged.get(path), Some(Some(_)));
        if !exists {
            return Err(TreeError::FileNotFound(path.to_string()));
        }
        state.staged.insert(path.to_string(), None);
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, TreeError> {
        let mut state = self.state.write().await;
        if state.staged.is_empty() {
            return Err(TreeError::NothingToCommit);
        }
        let staged = std::mem::take(&mut state.staged);
        for (path, change) in staged {
            match change {
                Some(content) => {
                    state.committed.insert(path, content);
                }
                None => {
                    state.committed.remove(&path);
                }
            }
        }
        let id = commit_id(state.commits.len(), message);
        state.commits.push(CommitRecord {
            id: id.clone(),
            message: message.to_string(),
        });
        Ok(id)
    }

    async fn list_files(&self) -> Result<Vec<String>, TreeError> {
        let state = self.state.read().await;
        Ok(state.committed.keys().cloned().collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        let state = self.state.read().await;
        state
            .committed
            .get(path)
            .cloned()
            .ok_or_else(|| TreeError::FileNotFound(path.to_string()))
    }

    async fn is_clean(&self) -> Result<bool, TreeError> {
        let state = self.state.read().await;
        Ok(state.staged.is_empty() && state.loose.is_empty())
    }
}
