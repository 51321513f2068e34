//! End-to-end lifecycle over memory-backed stores
//!
//! Exercises the public coordinator API through create, add, delete, tags
//! and auditing, asserting that after every successful step both stores
//! agree and the tree is clean.

mod common;

use common::{demo_content, memory_setup, test_icons};
use pretty_assertions::assert_eq;

use iconvault_core::domain::{Iconfile, IconfileDescriptor};
use iconvault_core::error::ServiceError;

fn iconfile(name: &str, format: &str, size: &str) -> Iconfile {
    let descriptor = IconfileDescriptor::new(format, size);
    let content = demo_content(name, &descriptor);
    Iconfile::new(descriptor, content)
}

#[tokio::test]
async fn create_add_delete_scenario() {
    let (_, tree, coordinator) = memory_setup();

    // Create "home" with one svg/24px rendition.
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();
    let report = coordinator.run_consistency_audit().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.divergences);
    assert_eq!(tree.commit_count().await, 1);

    // Add png/48px: both stores show 2 renditions, 2 commits.
    coordinator
        .add_iconfile("home", iconfile("home", "png", "48px"), "ux")
        .await
        .unwrap();
    let described = coordinator.describe_icon("home").await.unwrap();
    assert_eq!(described.iconfiles.len(), 2);
    assert_eq!(tree.commit_count().await, 2);

    // Delete svg/24px: one rendition left, 3 commits, audit clean.
    coordinator
        .delete_iconfile("home", &IconfileDescriptor::new("svg", "24px"), "ux")
        .await
        .unwrap();
    let described = coordinator.describe_icon("home").await.unwrap();
    assert_eq!(
        described.iconfiles,
        vec![IconfileDescriptor::new("png", "48px")]
    );
    assert_eq!(tree.commit_count().await, 3);

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.divergences);
    assert_eq!(report.files_checked, 1);
}

#[tokio::test]
async fn round_trip_lists_exactly_what_was_created() {
    use iconvault_core::tree::VersionedTree;

    let (_, tree, coordinator) = memory_setup();
    let icons = test_icons();
    common::add_test_data(&coordinator, &icons).await;

    let described = coordinator.describe_all_icons().await.unwrap();
    assert_eq!(described.len(), icons.len());
    for (icon, description) in icons.iter().zip(&described) {
        assert_eq!(description.attributes.name, icon.attributes.name);
        let mut expected: Vec<IconfileDescriptor> = icon
            .iconfiles
            .iter()
            .map(|f| f.descriptor.clone())
            .collect();
        expected.sort();
        let mut actual = description.iconfiles.clone();
        actual.sort();
        assert_eq!(actual, expected);

        // Content is byte-identical in both stores.
        for file in &icon.iconfiles {
            let from_catalog = coordinator
                .get_iconfile_content(&icon.attributes.name, &file.descriptor)
                .await
                .unwrap();
            assert_eq!(from_catalog, file.content);
            let path = coordinator
                .mapper()
                .to_path(&icon.attributes.name, &file.descriptor)
                .unwrap();
            assert_eq!(tree.read_file(&path).await.unwrap(), file.content);
        }
    }

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.divergences);
    assert_eq!(report.files_checked, 6);
}

#[tokio::test]
async fn delete_icon_twice_reports_not_found() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();
    coordinator
        .add_iconfile("home", iconfile("home", "svg", "48px"), "ux")
        .await
        .unwrap();

    coordinator.delete_icon("home", "ux").await.unwrap();
    assert!(coordinator.describe_all_icons().await.unwrap().is_empty());

    use iconvault_core::tree::VersionedTree;
    assert!(tree.list_files().await.unwrap().is_empty());

    let second = coordinator.delete_icon("home", "ux").await;
    assert!(matches!(second, Err(ServiceError::NotFound(_))));

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.divergences);
}

#[tokio::test]
async fn deleting_last_iconfile_cascades_into_icon_deletion() {
    let (_, _, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    coordinator
        .delete_iconfile("home", &IconfileDescriptor::new("svg", "24px"), "ux")
        .await
        .unwrap();

    // No icon may rest with zero renditions: the row is gone with the file.
    let described = coordinator.describe_icon("home").await;
    assert!(matches!(described, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn duplicate_create_and_add_are_rejected_before_any_commit() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    let err = coordinator
        .create_icon("home", iconfile("home", "png", "36px"), "ux")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let err = coordinator
        .add_iconfile("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    // The rejected operations never reached the tree.
    assert_eq!(tree.commit_count().await, 1);
}

#[tokio::test]
async fn invalid_descriptors_are_rejected_without_store_writes() {
    let (_, tree, coordinator) = memory_setup();

    let err = coordinator
        .create_icon("home", iconfile("home", "bmp", "24px"), "ux")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = coordinator
        .create_icon("../escape", iconfile("x", "svg", "24px"), "ux")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert!(coordinator.describe_all_icons().await.unwrap().is_empty());
    assert_eq!(tree.commit_count().await, 0);
}

#[tokio::test]
async fn tags_are_catalog_only_and_do_not_commit() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    coordinator.add_tag("home", "navigation").await.unwrap();
    coordinator.add_tag("home", "shell").await.unwrap();
    coordinator.remove_tag("home", "shell").await.unwrap();

    assert_eq!(coordinator.list_tags().await.unwrap(), vec!["navigation"]);
    let described = coordinator.describe_icon("home").await.unwrap();
    assert!(described.attributes.tags.contains("navigation"));

    // Tag traffic is metadata-only: one commit from the create, none since.
    assert_eq!(tree.commit_count().await, 1);

    let err = coordinator.add_tag("home", "").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn commit_messages_recover_user_action_and_descriptor() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "jane")
        .await
        .unwrap();
    coordinator
        .delete_icon("home", "jane")
        .await
        .unwrap();

    use iconvault_core::tree::{CommitAction, CommitMessage};
    let log = tree.commit_log().await;
    assert_eq!(log.len(), 2);

    let first: CommitMessage = log[0].message.parse().unwrap();
    assert_eq!(first.action, CommitAction::Create);
    assert_eq!(first.icon_name, "home");
    assert_eq!(first.user, "jane");

    let last: CommitMessage = log[1].message.parse().unwrap();
    assert_eq!(last.action, CommitAction::Delete);
    assert_eq!(last.descriptor, IconfileDescriptor::new("svg", "24px"));
}
