//! Git-backed versioned tree adapter
//!
//! Shells out to the `git` binary. Staging maps onto the index (`git add` /
//! `git rm`), commit-visibility onto HEAD: `list_files` and `read_file`
//! answer from the last commit (`git ls-tree`, `git show`), never from the
//! working tree, so staged changes stay invisible until `commit` lands them.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{TreeError, VersionedTree};

/// Versioned tree over a local git repository.
pub struct GitTree {
    root: PathBuf,
}

impl GitTree {
    /// Open an existing repository at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TreeError> {
        let root = root.into();
        if !root.join(".git").is_dir() {
            return Err(TreeError::InvalidRepository(format!(
                "{} is not a git repository",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Open `root`, initializing a fresh repository (with a local committer
    /// identity) if none exists yet.
    pub async fn init(root: impl Into<PathBuf>) -> Result<Self, TreeError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let tree = Self { root };
        if !tree.root.join(".git").is_dir() {
            debug!("initializing git repository at {}", tree.root.display());
            tree.git_ok(&["init", "-q"]).await?;
            tree.git_ok(&["config", "user.name", "iconvault"]).await?;
            tree.git_ok(&["config", "user.email", "iconvault@localhost"])
                .await?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output, TreeError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TreeError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                detail: e.to_string(),
            })
    }

    /// Run git, requiring a zero exit status; returns stdout.
    async fn git_ok(&self, args: &[&str]) -> Result<Vec<u8>, TreeError> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(TreeError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn has_head(&self) -> Result<bool, TreeError> {
        let output = self.git(&["rev-parse", "--verify", "-q", "HEAD"]).await?;
        Ok(output.status.success())
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, TreeError> {
        let relative = Path::new(path);
        let sane = !path.is_empty()
            && relative.is_relative()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !sane {
            return Err(TreeError::InvalidRepository(format!(
                "refusing path {path:?} outside the tree"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Remove directories left empty after a file removal, up to the root.
    async fn prune_empty_dirs(&self, path: &str) {
        let mut dir = match self.resolve(path) {
            Ok(abs) => abs.parent().map(Path::to_path_buf),
            Err(_) => None,
        };
        while let Some(current) = dir {
            if current == self.root {
                break;
            }
            match tokio::fs::read_dir(&current).await {
                Ok(mut entries) => match entries.next_entry().await {
                    Ok(None) => {
                        if let Err(e) = tokio::fs::remove_dir(&current).await {
                            warn!("could not prune {}: {}", current.display(), e);
                            break;
                        }
                        dir = current.parent().map(Path::to_path_buf);
                    }
                    _ => break,
                },
                Err(_) => break,
            }
        }
    }
}

#[async_trait]
impl VersionedTree for GitTree {
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TreeError> {
        let abs = self.resolve(path)?;
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&abs, content).await?;
        self.git_ok(&["add", "--", path]).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), TreeError> {
        self.resolve(path)?;
        let output = self.git(&["rm", "-q", "--", path]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("did not match any files") {
                return Err(TreeError::FileNotFound(path.to_string()));
            }
            return Err(TreeError::CommandFailed {
                command: format!("git rm -q -- {path}"),
                detail: stderr.trim().to_string(),
            });
        }
        self.prune_empty_dirs(path).await;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, TreeError> {
        let output = self.git(&["commit", "-q", "-m", message]).await?;
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stdout.contains("nothing to commit") || stderr.contains("nothing to commit") {
                return Err(TreeError::NothingToCommit);
            }
            return Err(TreeError::CommandFailed {
                command: "git commit".to_string(),
                detail: format!("{} {}", stdout.trim(), stderr.trim()),
            });
        }
        let head = self.git_ok(&["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&head).trim().to_string())
    }

    async fn list_files(&self) -> Result<Vec<String>, TreeError> {
        if !self.has_head().await? {
            return Ok(Vec::new());
        }
        let stdout = self.git_ok(&["ls-tree", "-r", "--name-only", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        self.resolve(path)?;
        if !self.has_head().await? {
            return Err(TreeError::FileNotFound(path.to_string()));
        }
        let object = format!("HEAD:{path}");
        let output = self.git(&["show", &object]).await?;
        if !output.status.success() {
            return Err(TreeError::FileNotFound(path.to_string()));
        }
        Ok(output.stdout)
    }

    async fn is_clean(&self) -> Result<bool, TreeError> {
        let stdout = self.git_ok(&["status", "--porcelain"]).await?;
        Ok(stdout.is_empty())
    }
}
