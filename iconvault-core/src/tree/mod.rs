//! Versioned tree contract - the file-tree side of the dual store
//!
//! The tree mirrors iconfile content on disk under version control. Writes
//! and deletes stage changes; nothing is durable or visible to `list_files`/
//! `read_file` until `commit` succeeds. One commit may be in flight at a time
//! against a given tree - the coordinator's global commit lock enforces this.

pub mod git;
pub mod memory;

pub use git::GitTree;
pub use memory::MemoryTree;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::IconfileDescriptor;

/// Tree-level failures
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("file \"{0}\" not found in tree")]
    FileNotFound(String),

    #[error("nothing staged to commit")]
    NothingToCommit,

    #[error("tree call timed out")]
    Timeout,

    #[error("tree I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("not a usable repository: {0}")]
    InvalidRepository(String),
}

/// Version-controlled directory of iconfile content.
///
/// Implementations: [`GitTree`] over a real git repository, [`MemoryTree`]
/// for tests and embedders.
#[async_trait]
pub trait VersionedTree: Send + Sync {
    /// Stage a file write (create or overwrite).
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TreeError>;

    /// Stage a file removal. Prunes directories left empty by the removal.
    async fn delete_file(&self, path: &str) -> Result<(), TreeError>;

    /// Commit all staged changes, returning the new commit id.
    async fn commit(&self, message: &str) -> Result<String, TreeError>;

    /// Paths present in the last commit (staged changes are invisible).
    async fn list_files(&self) -> Result<Vec<String>, TreeError>;

    /// Content of a path as of the last commit.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TreeError>;

    /// Whether the working tree has no uncommitted or untracked changes.
    async fn is_clean(&self) -> Result<bool, TreeError>;
}

/// The operation a commit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    Create,
    Add,
    Delete,
}

impl CommitAction {
    fn as_str(self) -> &'static str {
        match self {
            CommitAction::Create => "create",
            CommitAction::Add => "add",
            CommitAction::Delete => "delete",
        }
    }
}

/// Machine-recoverable commit message.
///
/// Rendered as a single line from which `(user, action, icon, descriptor)`
/// can be reconstructed for audit trails. The exact text is not contractual;
/// the round-trip is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub action: CommitAction,
    pub icon_name: String,
    pub descriptor: IconfileDescriptor,
    pub user: String,
}

impl CommitMessage {
    pub fn new(
        action: CommitAction,
        icon_name: impl Into<String>,
        descriptor: IconfileDescriptor,
        user: impl Into<String>,
    ) -> Self {
        Self {
            action,
            icon_name: icon_name.into(),
            descriptor,
            user: user.into(),
        }
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iconvault: {} icon={} format={} size={} by={}",
            self.action.as_str(),
            self.icon_name,
            self.descriptor.format,
            self.descriptor.size,
            self.user
        )
    }
}

impl FromStr for CommitMessage {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let rest = line
            .strip_prefix("iconvault: ")
            .ok_or_else(|| format!("not an iconvault commit message: {line:?}"))?;
        let (action, rest) = rest
            .split_once(' ')
            .ok_or_else(|| format!("truncated commit message: {line:?}"))?;
        let action = match action {
            "create" => CommitAction::Create,
            "add" => CommitAction::Add,
            "delete" => CommitAction::Delete,
            other => return Err(format!("unknown commit action {other:?}")),
        };

        let field = |rest: &str, key: &str| -> Result<(String, String), String> {
            let rest = rest
                .strip_prefix(key)
                .ok_or_else(|| format!("missing {key:?} in commit message: {line:?}"))?;
            match rest.split_once(' ') {
                Some((value, tail)) => Ok((value.to_string(), tail.to_string())),
                None => Ok((rest.to_string(), String::new())),
            }
        };

        let (icon_name, rest) = field(rest, "icon=")?;
        let (format, rest) = field(&rest, "format=")?;
        let (size, rest) = field(&rest, "size=")?;
        // The user field is last so it may contain spaces.
        let user = rest
            .strip_prefix("by=")
            .ok_or_else(|| format!("missing \"by=\" in commit message: {line:?}"))?
            .to_string();

        Ok(CommitMessage {
            action,
            icon_name,
            descriptor: IconfileDescriptor::new(format, size),
            user,
        })
    }
}
