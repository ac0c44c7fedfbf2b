//! Minimal-slice extraction from Rust workspaces.
//!
//! Given entry-point source files inside a loaded Cargo workspace and a
//! depth budget, defslice produces the smallest subset of type and
//! member declarations - taken verbatim from their original source
//! files - that explains every non-local symbol the entry points
//! reference, transitively, up to the budget. Each emitted declaration
//! can carry a trace of the reference paths that caused its inclusion.
//!
//! Semantic analysis is rust-analyzer's: a [`Workspace`] owns a
//! `RootDatabase` loaded through `ra_ap_load_cargo`, and all resolution
//! goes through `ra_ap_hir::Semantics`. Depth is budgeted in cross-type
//! hops; moving within a type is free, so a kept method drags in the
//! fields and siblings it touches without spending budget.
//!
//! ## Usage
//!
//! ```ignore
//! use defslice::{CancellationToken, SliceOptions, Workspace};
//!
//! let workspace = Workspace::load("path/to/workspace")?;
//! let options = SliceOptions { depth: 2, ..SliceOptions::default() };
//! let slices = workspace.find_minimal_definitions(
//!     "/abs/path/src/handler.rs",
//!     &options,
//!     &CancellationToken::new(),
//! )?;
//! for slice in slices {
//!     for (key, definition) in &slice.definitions {
//!         println!("{key}\n{}", definition.code);
//!     }
//! }
//! ```

mod aggregate;
mod crawler;
mod emit;
mod error;
mod keep_set;
mod semantics;
mod symbols;
#[cfg(test)]
mod testutil;
mod workspaces;

use std::path::Path;

use ra_ap_hir::{Semantics, attach_db};
use ra_ap_ide_db::RootDatabase;
use tracing::info;

#[doc(inline)]
pub use crate::emit::{Definition, ExplainMode, FileSlice};
#[doc(inline)]
pub use crate::error::SliceError;
// Re-exported so callers don't need a direct tokio-util dependency just
// to construct a token.
pub use tokio_util::sync::CancellationToken;

use crate::keep_set::{NamespaceFilter, Registry};

/// Configuration of a minimal-slice extraction.
#[derive(Debug, Clone)]
pub struct SliceOptions {
    /// Cross-type hop budget from the root document. Must be >= 0.
    pub depth: i32,
    /// Whether emitted declarations carry inclusion-path comments.
    pub explain: ExplainMode,
    /// When true, the root document's own declarations are omitted from
    /// the output; crawling still starts from its use sites.
    pub exclude_root_definitions: bool,
    /// Namespace prefix tokens to filter. Symbols whose containing
    /// namespace starts with any of these never appear in the output and
    /// never contribute edges to the crawl.
    pub excluded_namespaces: Vec<String>,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            explain: ExplainMode::None,
            exclude_root_definitions: false,
            excluded_namespaces: vec![
                "std".to_owned(),
                "core".to_owned(),
                "alloc".to_owned(),
            ],
        }
    }
}

/// A loaded workspace: the scoped owner of rust-analyzer's analysis
/// database. Dropping the handle releases the workspace.
///
/// One handle serves one extraction at a time; extractions borrow it
/// shared and keep all mutable state local.
pub struct Workspace {
    db: RootDatabase,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace").finish_non_exhaustive()
    }
}

impl Workspace {
    /// Load the Cargo workspace enclosing `path` into an analysis
    /// database.
    ///
    /// # Errors
    ///
    /// Returns a [`SliceError`] with the workspace-load kind when the
    /// path does not exist or the workspace cannot be opened. Loader
    /// warnings are forwarded to the logging sink and do not abort.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SliceError> {
        let db = workspaces::load_workspace(path.as_ref())?;
        Ok(Self { db })
    }

    /// Wrap an existing analysis database (e.g. a test fixture).
    pub fn new(db: RootDatabase) -> Self {
        Self { db }
    }

    /// Every declaration reachable within `depth` cross-type hops of the
    /// root document, with all members of every reached type - the full
    /// walk, ignoring minimisation.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative depth, `NotFound` when the root
    /// file is not in the workspace, `Cancelled` on cancellation.
    pub fn find_all_definitions(
        &self,
        root_file: &str,
        depth: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileSlice>, SliceError> {
        let options = SliceOptions {
            depth,
            explain: ExplainMode::None,
            ..SliceOptions::default()
        };
        self.run(&[root_file], &options, cancel, true)
    }

    /// The minimal slice for one root document.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative depth, `NotFound` when the root
    /// file is not in the workspace, `Cancelled` on cancellation.
    pub fn find_minimal_definitions(
        &self,
        root_file: &str,
        options: &SliceOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileSlice>, SliceError> {
        self.run(&[root_file], options, cancel, false)
    }

    /// The merged minimal slice over several root documents: member
    /// union per type, path-set union per member. The
    /// `exclude_root_definitions` option applies independently per
    /// document.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a negative depth or an empty root list,
    /// `NotFound` when any root file is missing, `Cancelled` on
    /// cancellation.
    pub fn find_aggregated_minimal_definitions(
        &self,
        root_files: &[&str],
        options: &SliceOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileSlice>, SliceError> {
        if root_files.is_empty() {
            return Err(SliceError::invalid_argument(
                "aggregation requires at least one root file",
            ));
        }
        self.run(root_files, options, cancel, false)
    }

    fn run(
        &self,
        root_files: &[&str],
        options: &SliceOptions,
        cancel: &CancellationToken,
        full: bool,
    ) -> Result<Vec<FileSlice>, SliceError> {
        if options.depth < 0 {
            return Err(SliceError::invalid_argument(format!(
                "depth must be non-negative, got {}",
                options.depth
            )));
        }

        // The new ra_ap_hir solver requires the database to be attached
        // to a thread-local for type inference operations. All semantic
        // analysis runs inside attach_db.
        attach_db(&self.db, || {
            let sema = Semantics::new(&self.db);
            if cancel.is_cancelled() {
                return Err(SliceError::cancelled());
            }

            let mut files = Vec::with_capacity(root_files.len());
            for path in root_files {
                let file = semantics::locate_document(&self.db, path)
                    .ok_or_else(|| SliceError::not_found(*path))?;
                files.push(file);
            }

            let keep =
                aggregate::crawl_many(&sema, &files, options, cancel)?;
            let keep = if full {
                let mut registry = Registry::from_keep(
                    NamespaceFilter::new(&options.excluded_namespaces),
                    keep,
                );
                crawler::expand_to_full(&sema, &mut registry);
                registry.into_keep_set()
            } else {
                keep
            };

            let slices = emit::emit(&sema, &keep, options.explain, cancel)?;
            info!(
                roots = root_files.len(),
                depth = options.depth,
                files = slices.len(),
                "slice.complete"
            );
            Ok(slices)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{token, workspace};

    use super::*;

    fn find_minimal(
        fixture: &str,
        root: &str,
        options: &SliceOptions,
    ) -> Vec<FileSlice> {
        workspace(fixture)
            .find_minimal_definitions(root, options, &token())
            .expect("extraction succeeds")
    }

    fn all_keys(slices: &[FileSlice]) -> Vec<String> {
        slices
            .iter()
            .flat_map(|s| s.definitions.keys().cloned())
            .collect()
    }

    fn definition<'a>(
        slices: &'a [FileSlice],
        key: &str,
    ) -> Option<&'a Definition> {
        slices.iter().find_map(|s| s.definitions.get(key))
    }

    const CROSS_FILE: &str = r#"
//- /a.rs crate:a deps:b
pub struct A;

impl A {
    pub fn f(&self) {
        b::B::g();
    }
}
//- /b.rs crate:b
pub struct B;

impl B {
    pub fn g() {}
    pub fn h() {}
}
"#;

    /// End-to-end: depth 1 keeps the root type in full and the used
    /// member of the referenced type; depth 0 stays in the root file.
    #[test]
    fn test_minimal_slice_end_to_end() {
        let deep = find_minimal(CROSS_FILE, "/a.rs", &SliceOptions::default());
        let keys = all_keys(&deep);
        assert!(keys.contains(&"/a.rs:a::A".to_owned()));
        assert!(keys.contains(&"/b.rs:b::B".to_owned()));
        let b = definition(&deep, "/b.rs:b::B").unwrap();
        assert!(b.code.contains("fn g"));
        assert!(!b.code.contains("fn h"));

        let shallow = find_minimal(
            CROSS_FILE,
            "/a.rs",
            &SliceOptions {
                depth: 0,
                ..SliceOptions::default()
            },
        );
        let keys = all_keys(&shallow);
        assert!(keys.contains(&"/a.rs:a::A".to_owned()));
        assert!(!keys.iter().any(|k| k.starts_with("/b.rs")));
    }

    /// Excluding root definitions drops the root document from the
    /// output entirely.
    #[test]
    fn test_exclude_root_definitions_omits_root_file() {
        let slices = find_minimal(
            CROSS_FILE,
            "/a.rs",
            &SliceOptions {
                exclude_root_definitions: true,
                ..SliceOptions::default()
            },
        );
        let keys = all_keys(&slices);
        assert!(!keys.iter().any(|k| k.starts_with("/a.rs")));
        assert!(keys.contains(&"/b.rs:b::B".to_owned()));
        let b = definition(&slices, "/b.rs:b::B").unwrap();
        assert!(b.code.contains("fn g"));
    }

    /// Full mode emits every member of every reached type.
    #[test]
    fn test_full_mode_keeps_all_members() {
        let slices = workspace(CROSS_FILE)
            .find_all_definitions("/a.rs", 1, &token())
            .expect("full walk succeeds");
        let b = definition(&slices, "/b.rs:b::B").expect("B emitted");
        assert!(b.code.contains("fn g"));
        assert!(b.code.contains("fn h"));
    }

    /// Generic instantiations collapse to one emitted definition.
    #[test]
    fn test_generic_instantiations_emit_once() {
        let slices = find_minimal(
            r#"
//- /a.rs crate:a deps:u
pub fn caller() {
    u::U::act::<u::P>();
    u::U::act::<u::Q>();
}
//- /u.rs crate:u
pub struct U;
pub struct P;
pub struct Q;

impl U {
    pub fn act<T>() {}
}
"#,
            "/a.rs",
            &SliceOptions::default(),
        );
        let u = definition(&slices, "/u.rs:u::U").expect("U emitted");
        assert_eq!(
            u.code.matches("fn act").count(),
            1,
            "one copy of the generic method: {}",
            u.code
        );
    }

    /// Aggregation over two roots unions members and provenance.
    #[test]
    fn test_aggregated_slice() {
        let options = SliceOptions {
            explain: ExplainMode::ReasonForInclusion,
            ..SliceOptions::default()
        };
        let slices = workspace(
            r#"
//- /a.rs crate:a deps:x
pub fn fa() {
    x::X::p();
}
//- /b.rs crate:b deps:x
pub fn fb() {
    x::X::q();
}
//- /x.rs crate:x
pub struct X;

impl X {
    pub fn p() {}
    pub fn q() {}
    pub fn r() {}
}
"#,
        )
        .find_aggregated_minimal_definitions(
            &["/a.rs", "/b.rs"],
            &options,
            &token(),
        )
        .expect("aggregation succeeds");

        let x = definition(&slices, "/x.rs:x::X").expect("X emitted");
        assert!(x.code.contains("fn p"));
        assert!(x.code.contains("fn q"));
        assert!(!x.code.contains("fn r"));
        assert!(x.code.contains("/a.rs"), "p's path names /a.rs");
        assert!(x.code.contains("/b.rs"), "q's path names /b.rs");
    }

    /// Namespace exclusion removes whole subtrees from the output.
    #[test]
    fn test_namespace_exclusion_end_to_end() {
        let slices = find_minimal(
            r#"
//- /a.rs crate:app deps:sys_log
pub fn run() {
    sys_log::Logger::log();
}
//- /log.rs crate:sys_log
pub struct Logger;

impl Logger {
    pub fn log() {}
}
"#,
            "/a.rs",
            &SliceOptions {
                depth: 10,
                excluded_namespaces: vec!["sys_log".to_owned()],
                ..SliceOptions::default()
            },
        );
        let keys = all_keys(&slices);
        assert!(
            !keys.iter().any(|k| k.contains("sys_log")),
            "excluded namespace leaked: {keys:?}"
        );
    }

    #[test]
    fn test_invalid_arguments() {
        let workspace = workspace(CROSS_FILE);

        let err = workspace
            .find_minimal_definitions(
                "/a.rs",
                &SliceOptions {
                    depth: -1,
                    ..SliceOptions::default()
                },
                &token(),
            )
            .expect_err("negative depth must fail");
        assert!(err.is_invalid_argument());

        let err = workspace
            .find_aggregated_minimal_definitions(
                &[],
                &SliceOptions::default(),
                &token(),
            )
            .expect_err("empty root list must fail");
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_missing_root_file() {
        let err = workspace(CROSS_FILE)
            .find_minimal_definitions(
                "/missing.rs",
                &SliceOptions::default(),
                &token(),
            )
            .expect_err("missing root must fail");
        assert!(err.is_not_found());
    }

    /// Cancellation surfaces as the cancelled kind and returns no
    /// partial results.
    #[test]
    fn test_cancellation() {
        let cancel = token();
        cancel.cancel();
        let err = workspace(CROSS_FILE)
            .find_minimal_definitions("/a.rs", &SliceOptions::default(), &cancel)
            .expect_err("cancelled extraction must fail");
        assert!(err.is_cancelled());
    }

    /// Case-insensitive root lookup.
    #[test]
    fn test_root_lookup_is_case_insensitive() {
        let slices =
            find_minimal(CROSS_FILE, "/A.RS", &SliceOptions::default());
        assert!(!slices.is_empty());
    }
}
