//! In-memory catalog adapter
//!
//! Backs tests and embedders that don't need persistence. Semantics match
//! the SQLite adapter; every operation takes the state lock once, so each is
//! atomic with respect to the catalog alone.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{IconAttributes, IconDescriptor, Iconfile, IconfileDescriptor};

use super::{CatalogError, CatalogStore};

#[derive(Debug, Clone)]
struct IconRecord {
    modified_by: String,
    tags: BTreeSet<String>,
    iconfiles: BTreeMap<IconfileDescriptor, Vec<u8>>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    icons: RwLock<BTreeMap<String, IconRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn describe(name: &str, record: &IconRecord) -> IconDescriptor {
    IconDescriptor {
        attributes: IconAttributes {
            name: name.to_string(),
            modified_by: record.modified_by.clone(),
            tags: record.tags.clone(),
        },
        iconfiles: record.iconfiles.keys().cloned().collect(),
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn create_icon(
        &self,
        icon_name: &str,
        modified_by: &str,
        initial_iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        if icons.contains_key(icon_name) {
            return Err(CatalogError::IconAlreadyExists(icon_name.to_string()));
        }
        let mut iconfiles = BTreeMap::new();
        iconfiles.insert(
            initial_iconfile.descriptor.clone(),
            initial_iconfile.content.clone(),
        );
        icons.insert(
            icon_name.to_string(),
            IconRecord {
                modified_by: modified_by.to_string(),
                tags: BTreeSet::new(),
                iconfiles,
            },
        );
        Ok(())
    }

    async fn add_iconfile(
        &self,
        icon_name: &str,
        modified_by: &str,
        iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        let record = icons
            .get_mut(icon_name)
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))?;
        if record.iconfiles.contains_key(&iconfile.descriptor) {
            return Err(CatalogError::IconfileAlreadyExists {
                icon_name: icon_name.to_string(),
                descriptor: iconfile.descriptor.clone(),
            });
        }
        record
            .iconfiles
            .insert(iconfile.descriptor.clone(), iconfile.content.clone());
        record.modified_by = modified_by.to_string();
        Ok(())
    }

    async fn get_iconfile_content(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<Vec<u8>, CatalogError> {
        let icons = self.icons.read().await;
        let record = icons
            .get(icon_name)
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))?;
        record
            .iconfiles
            .get(descriptor)
            .cloned()
            .ok_or_else(|| CatalogError::IconfileNotFound {
                icon_name: icon_name.to_string(),
                descriptor: descriptor.clone(),
            })
    }

    async fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        let record = icons
            .get_mut(icon_name)
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))?;
        record
            .iconfiles
            .remove(descriptor)
            .ok_or_else(|| CatalogError::IconfileNotFound {
                icon_name: icon_name.to_string(),
                descriptor: descriptor.clone(),
            })?;
        Ok(())
    }

    async fn delete_icon(&self, icon_name: &str) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        icons
            .remove(icon_name)
            .map(|_| ())
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))
    }

    async fn add_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        let record = icons
            .get_mut(icon_name)
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))?;
        record.tags.insert(tag.to_string());
        Ok(())
    }

    async fn remove_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        let mut icons = self.icons.write().await;
        let record = icons
            .get_mut(icon_name)
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))?;
        if !record.tags.remove(tag) {
            return Err(CatalogError::ConstraintViolation(format!(
                "tag \"{tag}\" is not attached to \"{icon_name}\""
            )));
        }
        Ok(())
    }

    async fn describe_all_icons(&self) -> Result<Vec<IconDescriptor>, CatalogError> {
        let icons = self.icons.read().await;
        Ok(icons
            .iter()
            .map(|(name, record)| describe(name, record))
            .collect())
    }

    async fn describe_icon(&self, icon_name: &str) -> Result<IconDescriptor, CatalogError> {
        let icons = self.icons.read().await;
        icons
            .get(icon_name)
            .map(|record| describe(icon_name, record))
            .ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))
    }

    async fn list_tags(&self) -> Result<Vec<String>, CatalogError> {
        let icons = self.icons.read().await;
        let tags: BTreeSet<String> = icons
            .values()
            .flat_map(|record| record.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }
}
