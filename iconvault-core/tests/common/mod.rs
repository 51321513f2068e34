//! Test helper functions shared across integration tests
//!
//! Shared via the tests/common/ pattern: fixture icon data mirroring the
//! demo set, store wrappers with switchable failure injection, and a
//! one-per-run tracing initializer.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;

use iconvault_core::catalog::{CatalogError, CatalogStore, MemoryCatalog};
use iconvault_core::domain::{Icon, IconAttributes, Iconfile, IconfileDescriptor};
use iconvault_core::pathmap::PathMapper;
use iconvault_core::sync::SyncCoordinator;
use iconvault_core::tree::{MemoryTree, TreeError, VersionedTree};

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn test_mapper() -> PathMapper {
    PathMapper::new(["svg", "png"], ["18px", "24px", "36px", "48px", "54px"])
}

/// Deterministic content bytes for a fixture rendition.
pub fn demo_content(icon_name: &str, descriptor: &IconfileDescriptor) -> Vec<u8> {
    format!(
        "<{} icon=\"{}\" size=\"{}\"/>",
        descriptor.format, icon_name, descriptor.size
    )
    .into_bytes()
}

fn demo_icon(name: &str, modified_by: &str, descriptors: &[(&str, &str)]) -> Icon {
    Icon {
        attributes: IconAttributes {
            name: name.to_string(),
            modified_by: modified_by.to_string(),
            tags: Default::default(),
        },
        iconfiles: descriptors
            .iter()
            .map(|(format, size)| {
                let descriptor = IconfileDescriptor::new(*format, *size);
                let content = demo_content(name, &descriptor);
                Iconfile::new(descriptor, content)
            })
            .collect(),
    }
}

/// The demo icon set used across tests.
pub fn test_icons() -> Vec<Icon> {
    vec![
        demo_icon(
            "attach_money",
            "ux",
            &[("svg", "18px"), ("svg", "24px"), ("png", "36px")],
        ),
        demo_icon(
            "cast_connected",
            "ux",
            &[("svg", "24px"), ("svg", "48px"), ("png", "36px")],
        ),
    ]
}

/// Create every fixture icon through the coordinator.
pub async fn add_test_data<C, T>(coordinator: &SyncCoordinator<C, T>, icons: &[Icon])
where
    C: CatalogStore + ?Sized,
    T: VersionedTree + ?Sized,
{
    for icon in icons {
        let mut iconfiles = icon.iconfiles.iter();
        let initial = iconfiles.next().expect("fixture icon without iconfiles");
        coordinator
            .create_icon(&icon.attributes.name, initial.clone(), &icon.attributes.modified_by)
            .await
            .expect("create fixture icon");
        for iconfile in iconfiles {
            coordinator
                .add_iconfile(&icon.attributes.name, iconfile.clone(), &icon.attributes.modified_by)
                .await
                .expect("add fixture iconfile");
        }
    }
}

/// Memory-backed coordinator plus handles to both stores.
pub fn memory_setup() -> (
    Arc<MemoryCatalog>,
    Arc<MemoryTree>,
    SyncCoordinator<MemoryCatalog, MemoryTree>,
) {
    init_test_logging();
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = Arc::new(MemoryTree::new());
    let coordinator =
        SyncCoordinator::new(Arc::clone(&catalog), Arc::clone(&tree), test_mapper());
    (catalog, tree, coordinator)
}

fn injected_tree_failure(op: &str) -> TreeError {
    TreeError::CommandFailed {
        command: op.to_string(),
        detail: "injected failure".to_string(),
    }
}

/// Tree wrapper that fails selected operations on demand.
#[derive(Default)]
pub struct FailingTree {
    pub inner: MemoryTree,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    fail_commits: AtomicBool,
}

impl FailingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, on: bool) {
        self.fail_commits.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionedTree for FailingTree {
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), TreeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_tree_failure("write_file"));
        }
        self.inner.write_file(path, content).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), TreeError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected_tree_failure("delete_file"));
        }
        self.inner.delete_file(path).await
    }

    async fn commit(&self, message: &str) -> Result<String, TreeError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(injected_tree_failure("commit"));
        }
        self.inner.commit(message).await
    }

    async fn list_files(&self) -> Result<Vec<String>, TreeError> {
        self.inner.list_files().await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        self.inner.read_file(path).await
    }

    async fn is_clean(&self) -> Result<bool, TreeError> {
        self.inner.is_clean().await
    }
}

/// Catalog wrapper that fails selected operations on demand.
#[derive(Default)]
pub struct FailingCatalog {
    pub inner: MemoryCatalog,
    fail_create_icon: AtomicBool,
    fail_add_iconfile: AtomicBool,
    fail_delete_icon: AtomicBool,
    fail_delete_iconfile: AtomicBool,
}

impl FailingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_icon(&self, on: bool) {
        self.fail_create_icon.store(on, Ordering::SeqCst);
    }

    pub fn fail_add_iconfile(&self, on: bool) {
        self.fail_add_iconfile.store(on, Ordering::SeqCst);
    }

    pub fn fail_delete_icon(&self, on: bool) {
        self.fail_delete_icon.store(on, Ordering::SeqCst);
    }

    pub fn fail_delete_iconfile(&self, on: bool) {
        self.fail_delete_iconfile.store(on, Ordering::SeqCst);
    }
}

fn injected_catalog_failure() -> CatalogError {
    CatalogError::Backend("injected failure".to_string())
}

#[async_trait]
impl CatalogStore for FailingCatalog {
    async fn create_icon(
        &self,
        icon_name: &str,
        modified_by: &str,
        initial_iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        if self.fail_create_icon.load(Ordering::SeqCst) {
            return Err(injected_catalog_failure());
        }
        self.inner
            .create_icon(icon_name, modified_by, initial_iconfile)
            .await
    }

    async fn add_iconfile(
        &self,
        icon_name: &str,
        modified_by: &str,
        iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        if self.fail_add_iconfile.load(Ordering::SeqCst) {
            return Err(injected_catalog_failure());
        }
        self.inner.add_iconfile(icon_name, modified_by, iconfile).await
    }

    async fn get_iconfile_content(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<Vec<u8>, CatalogError> {
        self.inner.get_iconfile_content(icon_name, descriptor).await
    }

    async fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<(), CatalogError> {
        if self.fail_delete_iconfile.load(Ordering::SeqCst) {
            return Err(injected_catalog_failure());
        }
        self.inner.delete_iconfile(icon_name, descriptor).await
    }

    async fn delete_icon(&self, icon_name: &str) -> Result<(), CatalogError> {
        if self.fail_delete_icon.load(Ordering::SeqCst) {
            return Err(injected_catalog_failure());
        }
        self.inner.delete_icon(icon_name).await
    }

    async fn add_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        self.inner.add_tag(icon_name, tag).await
    }

    async fn remove_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        self.inner.remove_tag(icon_name, tag).await
    }

    async fn describe_all_icons(
        &self,
    ) -> Result<Vec<iconvault_core::domain::IconDescriptor>, CatalogError> {
        self.inner.describe_all_icons().await
    }

    async fn describe_icon(
        &self,
        icon_name: &str,
    ) -> Result<iconvault_core::domain::IconDescriptor, CatalogError> {
        self.inner.describe_icon(icon_name).await
    }

    async fn list_tags(&self) -> Result<Vec<String>, CatalogError> {
        self.inner.list_tags().await
    }
}

/// Coordinator over failure-injectable stores.
pub fn failing_setup() -> (
    Arc<FailingCatalog>,
    Arc<FailingTree>,
    SyncCoordinator<FailingCatalog, FailingTree>,
) {
    init_test_logging();
    let catalog = Arc::new(FailingCatalog::new());
    let tree = Arc::new(FailingTree::new());
    let coordinator =
        SyncCoordinator::new(Arc::clone(&catalog), Arc::clone(&tree), test_mapper());
    (catalog, tree, coordinator)
}
