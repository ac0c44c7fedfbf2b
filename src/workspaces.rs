//! Workspace loading for defslice.
//!
//! This module initializes rust-analyzer's analysis database for the
//! Cargo workspace enclosing a path. It is the boundary where loader
//! failures become the workspace-load error kind; loader progress and
//! warnings go to the logging sink and never abort.

use std::path::Path;

use anyhow::{Context, anyhow};
use camino::Utf8PathBuf;
use ra_ap_ide_db::RootDatabase;
use ra_ap_load_cargo::{
    LoadCargoConfig, ProcMacroServerChoice, load_workspace_at,
};
use ra_ap_project_model::CargoConfig;
use tracing::{debug_span, info};

use crate::error::SliceError;

/// Bring the Cargo workspace enclosing `path` into an analysis database.
pub(crate) fn load_workspace(
    path: &Path,
) -> Result<RootDatabase, SliceError> {
    load_workspace_inner(path).map_err(SliceError::workspace_load)
}

fn load_workspace_inner(path: &Path) -> anyhow::Result<RootDatabase> {
    let _span = debug_span!("workspace.load", path = %path.display()).entered();

    // The vfs keys files by absolute path, and `locate_document` later
    // compares those keys byte-wise (case aside), so the root must be
    // pinned to one canonical spelling here - symlinked checkouts and
    // relative arguments would otherwise never match a loaded file.
    let canonical = path.canonicalize().with_context(|| {
        format!("workspace path '{}' cannot be canonicalized", path.display())
    })?;

    // The loader's path types are UTF-8 only; reject a non-UTF-8 root
    // here instead of failing somewhere inside project discovery.
    let workspace_path = Utf8PathBuf::from_path_buf(canonical.clone())
        .map_err(|_| {
            anyhow!("path contains invalid UTF-8: {}", canonical.display())
        })?;

    // Stock Cargo interpretation (default features, host target) is all
    // slicing needs.
    let cargo_config = CargoConfig::default();

    let load_config = LoadCargoConfig {
        // Slices are verbatim source text; code generated into OUT_DIR
        // by build scripts never reaches the emitter, so skipping the
        // `cargo check` pass keeps loading fast.
        load_out_dirs_from_check: false,

        // Declarations that only exist inside macro expansions are
        // skipped by the emitter anyway, so no proc-macro server is
        // needed to produce a slice.
        with_proc_macro_server: ProcMacroServerChoice::None,

        // Fill caches lazily so we don't analyze crates we don't care
        // about.
        prefill_caches: false,
    };

    // One call takes the build unit from manifests on disk to a queryable
    // semantic model: crate graph, syntax trees, name resolution. The
    // progress callback turns loader chatter into info events; nothing it
    // reports aborts the load.
    let (db, _, _) = load_workspace_at(
        workspace_path.as_std_path(),
        &cargo_config,
        &load_config,
        &|msg| {
            info!(message = %msg, "workspace.progress");
        },
    )
    .context("rust-analyzer could not load the workspace")?;

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_workspace_rejects_missing_path() {
        let err = load_workspace(Path::new("/nonexistent/path"))
            .expect_err("a path that does not exist must not load");
        assert!(err.is_workspace_load());
        assert!(err.to_string().contains("cannot be canonicalized"));
    }
}
