//! Divergence detection through the coordinator's audit entry point

mod common;

use common::{demo_content, memory_setup};
use pretty_assertions::assert_eq;

use iconvault_core::audit::Divergence;
use iconvault_core::domain::{Iconfile, IconfileDescriptor};

fn iconfile(name: &str, format: &str, size: &str) -> Iconfile {
    let descriptor = IconfileDescriptor::new(format, size);
    let content = demo_content(name, &descriptor);
    Iconfile::new(descriptor, content)
}

#[tokio::test]
async fn out_of_band_file_is_reported_as_exactly_one_orphan() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    // A file planted behind the coordinator's back.
    tree.place_committed("png/36px/rogue.png", b"rogue").await;

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert_eq!(
        report.divergences,
        vec![Divergence::OrphanInTree {
            path: "png/36px/rogue.png".to_string()
        }]
    );
    assert_eq!(report.files_checked, 1);
}

#[tokio::test]
async fn uncommitted_changes_are_reported_as_dirty_tree() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    tree.place_loose("scratch.txt", b"wip").await;

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert_eq!(report.divergences, vec![Divergence::DirtyTree]);
}

#[tokio::test]
async fn lost_tree_file_is_reported_missing() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    tree.remove_committed("svg/24px/home.svg").await;

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert_eq!(report.divergences.len(), 1);
    assert!(matches!(
        &report.divergences[0],
        Divergence::MissingInTree { path, .. } if path == "svg/24px/home.svg"
    ));
}

#[tokio::test]
async fn drifted_content_is_reported_as_mismatch() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();

    tree.place_committed("svg/24px/home.svg", b"<svg>tampered</svg>")
        .await;

    let report = coordinator.run_consistency_audit().await.unwrap();
    assert_eq!(report.divergences.len(), 1);
    match &report.divergences[0] {
        Divergence::ContentMismatch {
            icon_name,
            catalog_sha256,
            tree_sha256,
            ..
        } => {
            assert_eq!(icon_name, "home");
            assert_ne!(catalog_sha256, tree_sha256);
        }
        other => panic!("unexpected divergence: {other}"),
    }
}

#[tokio::test]
async fn multiple_divergences_are_collected_in_one_report() {
    let (_, tree, coordinator) = memory_setup();
    coordinator
        .create_icon("home", iconfile("home", "svg", "24px"), "ux")
        .await
        .unwrap();
    coordinator
        .add_iconfile("home", iconfile("home", "png", "36px"), "ux")
        .await
        .unwrap();

    tree.remove_committed("svg/24px/home.svg").await;
    tree.place_committed("png/48px/rogue.png", b"rogue").await;
    tree.place_loose("scratch.txt", b"wip").await;

    // The auditor never fails fast: all three findings in one report.
    let report = coordinator.run_consistency_audit().await.unwrap();
    assert_eq!(report.divergences.len(), 3);
    assert!(report
        .divergences
        .iter()
        .any(|d| matches!(d, Divergence::MissingInTree { .. })));
    assert!(report
        .divergences
        .iter()
        .any(|d| matches!(d, Divergence::OrphanInTree { .. })));
    assert!(report.divergences.contains(&Divergence::DirtyTree));
}
