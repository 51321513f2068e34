//! Sync coordinator - the dual-store saga engine
//!
//! Every public mutation is a two-step saga: a forward step against the
//! catalog, then a forward step against the versioned tree with a commit,
//! with a compensating action to reverse the catalog write if the tree step
//! fails. The catalog is always mutated first: it is the store readers query
//! synchronously, and the tree step is the slower, failure-prone I/O, which
//! fixes the compensation direction (reverse the catalog, never the tree).
//!
//! Serialization: a per-icon lock is held for the full duration of any
//! multi-step operation on that icon; tree commit sections are additionally
//! serialized by one global commit lock, since a commit stages the entire
//! working tree regardless of which icon it concerns. Once the catalog step
//! has been applied, the operation is obligated to attempt the tree step and
//! compensation before returning - there is no cancellation point between.

pub mod locks;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::audit::{AuditError, AuditReport, ConsistencyAuditor};
use crate::catalog::{CatalogError, CatalogStore};
use crate::domain::{IconAttributes, IconDescriptor, Iconfile, IconfileDescriptor};
use crate::error::ServiceError;
use crate::pathmap::PathMapper;
use crate::tree::{CommitAction, CommitMessage, TreeError, VersionedTree};

use self::locks::KeyedLocks;

/// Default bound on each individual store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrates every multi-step icon mutation across the two stores.
pub struct SyncCoordinator<C, T>
where
    C: CatalogStore + ?Sized,
    T: VersionedTree + ?Sized,
{
    catalog: Arc<C>,
    tree: Arc<T>,
    mapper: PathMapper,
    icon_locks: KeyedLocks,
    commit_lock: AsyncMutex<()>,
    call_timeout: Duration,
    /// Icons left inconsistent by a failed compensation, awaiting audit.
    flagged: Mutex<BTreeSet<String>>,
}

/// The tree-side half of a saga.
enum TreeChange<'a> {
    Write { path: &'a str, content: &'a [u8] },
    Delete { path: &'a str },
}

/// The catalog action that reverses a completed first step.
enum Compensation {
    DeleteIcon,
    DeleteIconfile(IconfileDescriptor),
    Reinsert {
        iconfile: Iconfile,
        recreate_icon: bool,
        user: String,
    },
}

impl<C, T> SyncCoordinator<C, T>
where
    C: CatalogStore + ?Sized,
    T: VersionedTree + ?Sized,
{
    pub fn new(catalog: Arc<C>, tree: Arc<T>, mapper: PathMapper) -> Self {
        Self {
            catalog,
            tree,
            mapper,
            icon_locks: KeyedLocks::new(),
            commit_lock: AsyncMutex::new(()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            flagged: Mutex::new(BTreeSet::new()),
        }
    }

    /// Override the per-store-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Icons flagged by a failed compensation; cleared only by operator
    /// action (a repair followed by a clean audit), never automatically.
    pub fn flagged_icons(&self) -> Vec<String> {
        self.flagged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn flag(&self, icon_name: &str) {
        self.flagged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(icon_name.to_string());
    }

    async fn catalog_call<O>(
        &self,
        fut: impl Future<Output = Result<O, CatalogError>>,
    ) -> Result<O, CatalogError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(CatalogError::Timeout))
    }

    async fn tree_call<O>(
        &self,
        fut: impl Future<Output = Result<O, TreeError>>,
    ) -> Result<O, TreeError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .unwrap_or(Err(TreeError::Timeout))
    }

    /// Apply one staged change and commit it, under the global commit lock.
    /// The clean-tree invariant is asserted as a post-condition of every
    /// commit; a violation is out-of-band state for the auditor, not a
    /// failure of this operation.
    async fn commit_tree_change(
        &self,
        change: TreeChange<'_>,
        message: &CommitMessage,
    ) -> Result<String, TreeError> {
        let _commit_guard = self.commit_lock.lock().await;
        match change {
            TreeChange::Write { path, content } => {
                self.tree_call(self.tree.write_file(path, content)).await?;
            }
            TreeChange::Delete { path } => {
                self.tree_call(self.tree.delete_file(path)).await?;
            }
        }
        let commit_id = self.tree_call(self.tree.commit(&message.to_string())).await?;
        match self.tree_call(self.tree.is_clean()).await {
            Ok(true) => {}
            Ok(false) => warn!(commit = %commit_id, "working tree not clean after commit"),
            Err(e) => warn!(commit = %commit_id, "clean-status query failed after commit: {e}"),
        }
        debug!(commit = %commit_id, "committed: {message}");
        Ok(commit_id)
    }

    /// Reverse the catalog step after a failed tree step. One attempt only:
    /// success rolls the saga back (`Sync`, retryable), failure leaves the
    /// stores disagreeing (`Diverged`, fatal, flagged for audit).
    async fn compensate(
        &self,
        icon_name: &str,
        cause: TreeError,
        action: Compensation,
    ) -> ServiceError {
        warn!(icon = %icon_name, "tree step failed ({cause}), compensating catalog");
        let (result, description) = match action {
            Compensation::DeleteIcon => (
                self.catalog_call(self.catalog.delete_icon(icon_name)).await,
                format!("removed icon \"{icon_name}\" from catalog"),
            ),
            Compensation::DeleteIconfile(descriptor) => (
                self.catalog_call(self.catalog.delete_iconfile(icon_name, &descriptor))
                    .await,
                format!("removed iconfile {descriptor} of \"{icon_name}\" from catalog"),
            ),
            Compensation::Reinsert {
                iconfile,
                recreate_icon,
                user,
            } => {
                let descriptor = iconfile.descriptor.clone();
                let result = if recreate_icon {
                    self.catalog_call(self.catalog.create_icon(icon_name, &user, &iconfile))
                        .await
                } else {
                    self.catalog_call(self.catalog.add_iconfile(icon_name, &user, &iconfile))
                        .await
                };
                (
                    result,
                    format!("restored iconfile {descriptor} of \"{icon_name}\" in catalog"),
                )
            }
        };
        match result {
            Ok(()) => {
                info!(icon = %icon_name, "compensation succeeded: {description}");
                ServiceError::Sync {
                    cause,
                    compensation: description,
                }
            }
            Err(compensation_failure) => {
                self.flag(icon_name);
                let err = ServiceError::Diverged {
                    icon_name: icon_name.to_string(),
                    cause: format!("tree step failed: {cause}"),
                    compensation_failure,
                };
                err.log_if_integrity_critical();
                err
            }
        }
    }

    /// Create an icon with its initial iconfile.
    pub async fn create_icon(
        &self,
        icon_name: &str,
        initial_iconfile: Iconfile,
        user: &str,
    ) -> Result<IconDescriptor, ServiceError> {
        let path = self
            .mapper
            .to_path(icon_name, &initial_iconfile.descriptor)?;
        let _icon_guard = self.icon_locks.acquire(icon_name).await;

        self.catalog_call(self.catalog.create_icon(icon_name, user, &initial_iconfile))
            .await
            .map_err(ServiceError::from)?;

        let message = CommitMessage::new(
            CommitAction::Create,
            icon_name,
            initial_iconfile.descriptor.clone(),
            user,
        );
        let change = TreeChange::Write {
            path: &path,
            content: &initial_iconfile.content,
        };
        if let Err(cause) = self.commit_tree_change(change, &message).await {
            return Err(self.compensate(icon_name, cause, Compensation::DeleteIcon).await);
        }

        info!(icon = %icon_name, user = %user, "icon created");
        Ok(IconDescriptor {
            attributes: IconAttributes {
                name: icon_name.to_string(),
                modified_by: user.to_string(),
                tags: BTreeSet::new(),
            },
            iconfiles: vec![initial_iconfile.descriptor],
        })
    }

    /// Add a rendition to an existing icon; returns the tree path it maps to.
    pub async fn add_iconfile(
        &self,
        icon_name: &str,
        iconfile: Iconfile,
        user: &str,
    ) -> Result<String, ServiceError> {
        let path = self.mapper.to_path(icon_name, &iconfile.descriptor)?;
        let _icon_guard = self.icon_locks.acquire(icon_name).await;

        self.catalog_call(self.catalog.add_iconfile(icon_name, user, &iconfile))
            .await
            .map_err(ServiceError::from)?;

        let message = CommitMessage::new(
            CommitAction::Add,
            icon_name,
            iconfile.descriptor.clone(),
            user,
        );
        let change = TreeChange::Write {
            path: &path,
            content: &iconfile.content,
        };
        if let Err(cause) = self.commit_tree_change(change, &message).await {
            let action = Compensation::DeleteIconfile(iconfile.descriptor);
            return Err(self.compensate(icon_name, cause, action).await);
        }

        info!(icon = %icon_name, descriptor = %message.descriptor, "iconfile added");
        Ok(path)
    }

    /// Delete one rendition. Deleting the last rendition cascades into
    /// deleting the icon itself - an icon never rests with zero iconfiles.
    pub async fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
        user: &str,
    ) -> Result<(), ServiceError> {
        let _icon_guard = self.icon_locks.acquire(icon_name).await;
        self.delete_iconfile_locked(icon_name, descriptor, user).await
    }

    /// Delete an icon: every rendition, then the row. Idempotent per
    /// rendition and resumable - re-invoking on a partially completed delete
    /// converges to full deletion instead of erroring on what is already
    /// gone.
    pub async fn delete_icon(&self, icon_name: &str, user: &str) -> Result<(), ServiceError> {
        self.mapper.validate_name(icon_name)?;
        let _icon_guard = self.icon_locks.acquire(icon_name).await;

        let described = self
            .catalog_call(self.catalog.describe_icon(icon_name))
            .await
            .map_err(ServiceError::from)?;

        for descriptor in &described.iconfiles {
            match self.delete_iconfile_locked(icon_name, descriptor, user).await {
                Ok(()) => {}
                Err(ServiceError::NotFound(_)) => {
                    debug!(icon = %icon_name, descriptor = %descriptor, "already removed, continuing");
                }
                Err(other) => return Err(other),
            }
        }

        // The last rendition's cascade normally removes the row; tolerate
        // both that and a row that had no renditions to begin with.
        match self.catalog_call(self.catalog.delete_icon(icon_name)).await {
            Ok(()) | Err(CatalogError::IconNotFound(_)) => {
                info!(icon = %icon_name, user = %user, "icon deleted");
                Ok(())
            }
            Err(other) => Err(ServiceError::Catalog(other)),
        }
    }

    async fn delete_iconfile_locked(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
        user: &str,
    ) -> Result<(), ServiceError> {
        let path = self.mapper.to_path(icon_name, descriptor)?;

        // Read the bytes up front: they are the compensation payload.
        let content = self
            .catalog_call(self.catalog.get_iconfile_content(icon_name, descriptor))
            .await
            .map_err(ServiceError::from)?;
        let described = self
            .catalog_call(self.catalog.describe_icon(icon_name))
            .await
            .map_err(ServiceError::from)?;
        let is_last = described.iconfiles.len() == 1;

        self.catalog_call(self.catalog.delete_iconfile(icon_name, descriptor))
            .await
            .map_err(ServiceError::from)?;

        if is_last {
            if let Err(cascade_failure) =
                self.catalog_call(self.catalog.delete_icon(icon_name)).await
            {
                // The cascade is part of the catalog step: put the rendition
                // back so the catalog never rests with an empty icon row.
                warn!(icon = %icon_name, "cascade delete failed ({cascade_failure}), restoring iconfile");
                let iconfile = Iconfile::new(descriptor.clone(), content);
                return match self
                    .catalog_call(self.catalog.add_iconfile(icon_name, user, &iconfile))
                    .await
                {
                    Ok(()) => Err(ServiceError::Catalog(cascade_failure)),
                    Err(compensation_failure) => {
                        self.flag(icon_name);
                        let err = ServiceError::Diverged {
                            icon_name: icon_name.to_string(),
                            cause: format!("cascade delete failed: {cascade_failure}"),
                            compensation_failure,
                        };
                        err.log_if_integrity_critical();
                        Err(err)
                    }
                };
            }
        }

        let message = CommitMessage::new(CommitAction::Delete, icon_name, descriptor.clone(), user);
        match self
            .commit_tree_change(TreeChange::Delete { path: &path }, &message)
            .await
        {
            Ok(_) => {
                info!(icon = %icon_name, descriptor = %descriptor, "iconfile deleted");
                Ok(())
            }
            // The file is already absent: the goal state holds, e.g. when a
            // previous delete got as far as the tree before failing. Treat
            // as converged rather than compensating into a livelock.
            Err(TreeError::FileNotFound(_)) => {
                warn!(icon = %icon_name, path = %path, "tree file already absent, converging");
                Ok(())
            }
            Err(cause) => {
                let action = Compensation::Reinsert {
                    iconfile: Iconfile::new(descriptor.clone(), content),
                    recreate_icon: is_last,
                    user: user.to_string(),
                };
                Err(self.compensate(icon_name, cause, action).await)
            }
        }
    }

    /// Attach a tag. Catalog-only: no tree step, no compensation, no icon
    /// lock beyond the catalog's own atomicity.
    pub async fn add_tag(&self, icon_name: &str, tag: &str) -> Result<(), ServiceError> {
        validate_tag(tag)?;
        self.catalog_call(self.catalog.add_tag(icon_name, tag))
            .await
            .map_err(ServiceError::from)
    }

    /// Detach a tag. Catalog-only.
    pub async fn remove_tag(&self, icon_name: &str, tag: &str) -> Result<(), ServiceError> {
        validate_tag(tag)?;
        self.catalog_call(self.catalog.remove_tag(icon_name, tag))
            .await
            .map_err(ServiceError::from)
    }

    pub async fn describe_all_icons(&self) -> Result<Vec<IconDescriptor>, ServiceError> {
        self.catalog_call(self.catalog.describe_all_icons())
            .await
            .map_err(ServiceError::from)
    }

    pub async fn describe_icon(&self, icon_name: &str) -> Result<IconDescriptor, ServiceError> {
        self.catalog_call(self.catalog.describe_icon(icon_name))
            .await
            .map_err(ServiceError::from)
    }

    pub async fn get_iconfile_content(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<Vec<u8>, ServiceError> {
        self.mapper.validate(descriptor)?;
        self.catalog_call(self.catalog.get_iconfile_content(icon_name, descriptor))
            .await
            .map_err(ServiceError::from)
    }

    pub async fn list_tags(&self) -> Result<Vec<String>, ServiceError> {
        self.catalog_call(self.catalog.list_tags())
            .await
            .map_err(ServiceError::from)
    }

    /// Walk both stores and report every divergence. Holds the global commit
    /// lock for the duration so no writer can interleave a half-applied saga
    /// into the snapshot.
    pub async fn run_consistency_audit(&self) -> Result<AuditReport, AuditError> {
        let _commit_guard = self.commit_lock.lock().await;
        let auditor = ConsistencyAuditor::new(&*self.catalog, &*self.tree, &self.mapper);
        auditor.run().await
    }
}

fn validate_tag(tag: &str) -> Result<(), ServiceError> {
    if tag.is_empty() || tag.trim() != tag {
        return Err(ServiceError::Validation(format!("invalid tag {tag:?}")));
    }
    Ok(())
}
