//! Aggregation of crawls over multiple entry documents.
//!
//! Each entry document gets its own crawl with a fresh registry, then
//! the per-document keep-sets merge: member union per type, path-set
//! union per member, root-set union. `exclude_root_definitions` applies
//! per document - a document's own declarations are suppressed in *its*
//! crawl, yet survive when another entry document references them.

use ra_ap_base_db::FileId;
use ra_ap_hir::Semantics;
use ra_ap_ide_db::RootDatabase;
use tokio_util::sync::CancellationToken;

use crate::SliceOptions;
use crate::crawler::{CrawlParams, crawl};
use crate::error::SliceError;
use crate::keep_set::{KeepSet, NamespaceFilter, Registry};

/// Crawl every entry document in order and merge the results.
pub(crate) fn crawl_many(
    sema: &Semantics<'_, RootDatabase>,
    root_files: &[FileId],
    options: &SliceOptions,
    cancel: &CancellationToken,
) -> Result<KeepSet, SliceError> {
    let mut merged = KeepSet::new();
    for &root_file in root_files {
        if cancel.is_cancelled() {
            return Err(SliceError::cancelled());
        }
        let mut registry = Registry::new(NamespaceFilter::new(
            &options.excluded_namespaces,
        ));
        crawl(
            sema,
            &mut registry,
            &CrawlParams {
                root_file,
                depth: options.depth,
                exclude_root_definitions: options.exclude_root_definitions,
            },
            cancel,
        )?;
        merged.merge(registry.into_keep_set());
    }
    Ok(merged)
}
