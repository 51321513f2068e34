//! Consistency auditor - read-only verification of the dual store
//!
//! Walks the catalog forward (every described iconfile must exist in the
//! tree with byte-identical content), the tree backward (every file must
//! correspond to a checked catalog row), and asserts the clean-tree
//! invariant. The auditor never fails fast: it accumulates every divergence
//! it finds and returns them in one report. Content comparisons are
//! byte-exact; mismatches are reported with SHA-256 digests of both sides.

use std::collections::BTreeSet;
use std::fmt;

use futures::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{CatalogError, CatalogStore};
use crate::domain::IconfileDescriptor;
use crate::pathmap::PathMapper;
use crate::tree::{TreeError, VersionedTree};

/// A walk over one of the stores failed outright; no report was produced.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("catalog walk failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("tree walk failed: {0}")]
    Tree(#[from] TreeError),
}

/// One detected disagreement between the two stores.
///
/// Findings are data, not errors: a report may carry any number of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// The catalog describes this iconfile but the tree has no file at its
    /// mapped path.
    MissingInTree {
        icon_name: String,
        descriptor: IconfileDescriptor,
        path: String,
    },
    /// The catalog describes this iconfile but cannot produce its content.
    MissingInCatalog {
        icon_name: String,
        descriptor: IconfileDescriptor,
        path: String,
    },
    /// Both stores hold the file but the bytes differ.
    ContentMismatch {
        icon_name: String,
        descriptor: IconfileDescriptor,
        path: String,
        catalog_sha256: String,
        tree_sha256: String,
    },
    /// The catalog row cannot be mapped to any tree path.
    Unmappable {
        icon_name: String,
        descriptor: IconfileDescriptor,
        reason: String,
    },
    /// A tree file no checked catalog row accounts for.
    OrphanInTree { path: String },
    /// The working tree has uncommitted or untracked changes at rest.
    DirtyTree,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::MissingInTree { path, .. } => {
                write!(f, "missing in tree: {path}")
            }
            Divergence::MissingInCatalog {
                icon_name,
                descriptor,
                ..
            } => write!(f, "missing in catalog: {descriptor} of \"{icon_name}\""),
            Divergence::ContentMismatch {
                path,
                catalog_sha256,
                tree_sha256,
                ..
            } => write!(
                f,
                "content mismatch at {path}: catalog {catalog_sha256} != tree {tree_sha256}"
            ),
            Divergence::Unmappable {
                icon_name,
                descriptor,
                reason,
            } => write!(
                f,
                "unmappable catalog row {descriptor} of \"{icon_name}\": {reason}"
            ),
            Divergence::OrphanInTree { path } => write!(f, "orphan in tree: {path}"),
            Divergence::DirtyTree => write!(f, "working tree is dirty"),
        }
    }
}

/// Outcome of one full audit pass.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub divergences: Vec<Divergence>,
    /// Number of catalog iconfiles whose tree peer was checked.
    pub files_checked: usize,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read-only verifier over both stores.
///
/// Must run while no coordinator operation holds the global commit lock, so
/// in-progress sagas are not misread as divergence;
/// `SyncCoordinator::run_consistency_audit` arranges exactly that.
pub struct ConsistencyAuditor<'a, C, T>
where
    C: CatalogStore + ?Sized,
    T: VersionedTree + ?Sized,
{
    catalog: &'a C,
    tree: &'a T,
    mapper: &'a PathMapper,
}

impl<'a, C, T> ConsistencyAuditor<'a, C, T>
where
    C: CatalogStore + ?Sized,
    T: VersionedTree + ?Sized,
{
    pub fn new(catalog: &'a C, tree: &'a T, mapper: &'a PathMapper) -> Self {
        Self {
            catalog,
            tree,
            mapper,
        }
    }

    /// Catalog -> tree: byte-compare every described iconfile against its
    /// mapped path. Returns the findings and the set of paths checked.
    pub async fn verify_forward(
        &self,
    ) -> Result<(Vec<Divergence>, BTreeSet<String>), AuditError> {
        let icons = self.catalog.describe_all_icons().await?;

        let mut checks = Vec::new();
        for icon in &icons {
            for descriptor in &icon.iconfiles {
                checks.push(self.check_iconfile(&icon.attributes.name, descriptor));
            }
        }
        let results = join_all(checks).await;

        let mut divergences = Vec::new();
        let mut checked = BTreeSet::new();
        for (path, divergence) in results {
            if let Some(path) = path {
                checked.insert(path);
            }
            if let Some(divergence) = divergence {
                divergences.push(divergence);
            }
        }
        debug!(
            checked = checked.len(),
            findings = divergences.len(),
            "forward walk complete"
        );
        Ok((divergences, checked))
    }

    async fn check_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> (Option<String>, Option<Divergence>) {
        let path = match self.mapper.to_path(icon_name, descriptor) {
            Ok(path) => path,
            Err(e) => {
                return (
                    None,
                    Some(Divergence::Unmappable {
                        icon_name: icon_name.to_string(),
                        descriptor: descriptor.clone(),
                        reason: e.to_string(),
                    }),
                )
            }
        };

        let catalog_content = match self
            .catalog
            .get_iconfile_content(icon_name, descriptor)
            .await
        {
            Ok(content) => content,
            Err(_) => {
                return (
                    Some(path.clone()),
                    Some(Divergence::MissingInCatalog {
                        icon_name: icon_name.to_string(),
                        descriptor: descriptor.clone(),
                        path,
                    }),
                )
            }
        };

        let tree_content = match self.tree.read_file(&path).await {
            Ok(content) => content,
            Err(_) => {
                return (
                    Some(path.clone()),
                    Some(Divergence::MissingInTree {
                        icon_name: icon_name.to_string(),
                        descriptor: descriptor.clone(),
                        path,
                    }),
                )
            }
        };

        if catalog_content != tree_content {
            let divergence = Divergence::ContentMismatch {
                icon_name: icon_name.to_string(),
                descriptor: descriptor.clone(),
                path: path.clone(),
                catalog_sha256: sha256_hex(&catalog_content),
                tree_sha256: sha256_hex(&tree_content),
            };
            return (Some(path), Some(divergence));
        }
        (Some(path), None)
    }

    /// Tree -> catalog: every file not accounted for by the forward walk is
    /// an orphan.
    pub async fn verify_backward(
        &self,
        checked_paths: &BTreeSet<String>,
    ) -> Result<Vec<Divergence>, AuditError> {
        let files = self.tree.list_files().await?;
        Ok(files
            .into_iter()
            .filter(|path| !checked_paths.contains(path))
            .map(|path| Divergence::OrphanInTree { path })
            .collect())
    }

    /// The tree must have no uncommitted or untracked changes at rest.
    pub async fn verify_clean_tree(&self) -> Result<Option<Divergence>, AuditError> {
        Ok(if self.tree.is_clean().await? {
            None
        } else {
            Some(Divergence::DirtyTree)
        })
    }

    /// Full pass: forward, backward, clean.
    pub async fn run(&self) -> Result<AuditReport, AuditError> {
        let (mut divergences, checked) = self.verify_forward().await?;
        divergences.extend(self.verify_backward(&checked).await?);
        if let Some(dirty) = self.verify_clean_tree().await? {
            divergences.push(dirty);
        }

        if divergences.is_empty() {
            info!(files_checked = checked.len(), "audit clean");
        } else {
            info!(
                files_checked = checked.len(),
                divergences = divergences.len(),
                "audit found divergences"
            );
        }
        Ok(AuditReport {
            divergences,
            files_checked: checked.len(),
        })
    }
}
