//! Shared helpers for unit tests.
//!
//! The new ra_ap_hir solver requires the database to be attached to a
//! thread-local for type inference, so every test runs its body inside
//! `attach_db`, the same way the public API methods do.

use ra_ap_hir::attach_db;
use ra_ap_ide_db::RootDatabase;
use ra_ap_test_fixture::WithFixture;
use tokio_util::sync::CancellationToken;

/// Build a fixture database and run a test body against it with the
/// database attached.
pub(crate) fn with_fixture<T>(
    fixture: &str,
    f: impl FnOnce(&RootDatabase) -> T,
) -> T {
    let db = RootDatabase::with_files(fixture);
    attach_db(&db, || f(&db))
}

/// Build a [`crate::Workspace`] over a fixture database. The public API
/// methods attach the database themselves, so callers need no wrapper.
pub(crate) fn workspace(fixture: &str) -> crate::Workspace {
    crate::Workspace::new(RootDatabase::with_files(fixture))
}

/// A fresh, un-cancelled token.
pub(crate) fn token() -> CancellationToken {
    CancellationToken::new()
}
