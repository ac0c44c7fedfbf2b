//! Integration tests for defslice.
//!
//! These tests load a real Cargo fixture through the public API, which
//! exercises workspace discovery end to end (Cargo metadata, vfs, crate
//! graph) rather than the in-memory fixtures the unit tests use.

use std::path::PathBuf;

use defslice::{CancellationToken, ExplainMode, SliceOptions, Workspace};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/minimal_crate")
}

/// A root file path as the loaded workspace knows it (canonical).
fn root_file() -> String {
    fixture_path()
        .join("src/lib.rs")
        .canonicalize()
        .expect("fixture exists")
        .to_str()
        .expect("utf-8 path")
        .to_owned()
}

#[test]
fn test_minimal_slice_over_real_workspace() {
    let workspace =
        Workspace::load(fixture_path()).expect("fixture workspace loads");

    let options = SliceOptions {
        depth: 1,
        explain: ExplainMode::None,
        exclude_root_definitions: false,
        excluded_namespaces: vec!["std".to_owned(), "core".to_owned()],
    };
    let slices = workspace
        .find_minimal_definitions(&root_file(), &options, &CancellationToken::new())
        .expect("extraction succeeds");

    let all_code: String = slices
        .iter()
        .flat_map(|s| s.definitions.values())
        .map(|d| d.code.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n");

    // The root type comes back in full.
    assert!(all_code.contains("pub fn handle"));
    // The referenced member and the mandatory associated const survive;
    // the unreferenced member does not.
    assert!(all_code.contains("pub fn fetch"));
    assert!(all_code.contains("CAPACITY"));
    assert!(!all_code.contains("fn evict"));
}

#[test]
fn test_missing_root_is_not_found() {
    let workspace =
        Workspace::load(fixture_path()).expect("fixture workspace loads");
    let err = workspace
        .find_minimal_definitions(
            "/no/such/file.rs",
            &SliceOptions::default(),
            &CancellationToken::new(),
        )
        .expect_err("unknown root must fail");
    assert!(err.is_not_found());
}

#[test]
fn test_load_rejects_missing_workspace() {
    let err = Workspace::load("/nonexistent/workspace")
        .expect_err("missing workspace must fail");
    assert!(err.is_workspace_load());
}
