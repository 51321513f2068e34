//! Catalog store contract - the relational side of the dual store
//!
//! The catalog is the authoritative owner of icon metadata and holds a full
//! copy of every rendition's content bytes. Each contract operation must be
//! atomic with respect to the catalog alone (the adapter's own transaction);
//! cross-store coordination lives in the sync coordinator, not here.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{IconDescriptor, Iconfile, IconfileDescriptor};

/// Catalog-level failures
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("icon \"{0}\" not found in catalog")]
    IconNotFound(String),

    #[error("iconfile {descriptor} of \"{icon_name}\" not found in catalog")]
    IconfileNotFound {
        icon_name: String,
        descriptor: IconfileDescriptor,
    },

    #[error("icon \"{0}\" already exists in catalog")]
    IconAlreadyExists(String),

    #[error("iconfile {descriptor} of \"{icon_name}\" already exists in catalog")]
    IconfileAlreadyExists {
        icon_name: String,
        descriptor: IconfileDescriptor,
    },

    #[error("catalog constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("catalog call timed out")]
    Timeout,

    #[error("catalog backend error: {0}")]
    Backend(String),
}

impl CatalogError {
    /// Whether this is a missing-row precondition failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::IconNotFound(_) | CatalogError::IconfileNotFound { .. }
        )
    }
}

/// Relational store of icon metadata and content.
///
/// Implementations: [`SqliteCatalog`] for persistent deployments,
/// [`MemoryCatalog`] for tests and embedders.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create an icon row with its initial iconfile.
    async fn create_icon(
        &self,
        icon_name: &str,
        modified_by: &str,
        initial_iconfile: &Iconfile,
    ) -> Result<(), CatalogError>;

    /// Add a rendition to an existing icon.
    async fn add_iconfile(
        &self,
        icon_name: &str,
        modified_by: &str,
        iconfile: &Iconfile,
    ) -> Result<(), CatalogError>;

    /// Read one rendition's content bytes.
    async fn get_iconfile_content(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<Vec<u8>, CatalogError>;

    /// Delete one rendition. The icon row stays, even if this was the last
    /// rendition; cascading is the coordinator's decision.
    async fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<(), CatalogError>;

    /// Delete an icon row and all its renditions.
    async fn delete_icon(&self, icon_name: &str) -> Result<(), CatalogError>;

    /// Attach a tag to an icon. Adding a tag twice is a no-op.
    async fn add_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError>;

    /// Detach a tag from an icon.
    async fn remove_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError>;

    /// Describe every icon: metadata + rendition descriptors, content-free.
    /// Ordered by icon name, then by descriptor, for deterministic listings.
    async fn describe_all_icons(&self) -> Result<Vec<IconDescriptor>, CatalogError>;

    /// Describe a single icon.
    async fn describe_icon(&self, icon_name: &str) -> Result<IconDescriptor, CatalogError>;

    /// All tags present on any icon, sorted.
    async fn list_tags(&self) -> Result<Vec<String>, CatalogError>;
}
