//! Error types for defslice.

use std::backtrace::Backtrace;
use std::fmt;

/// Error type for slice extraction operations.
///
/// This error captures the unrecoverable conditions of an extraction:
/// bad arguments, a missing root document, a workspace that cannot be
/// loaded, cooperative cancellation, and semantic-surface contract
/// violations. Recoverable conditions during a crawl (a symbol without
/// source, a macro-generated declaration) are logged and skipped instead.
#[derive(Debug)]
pub struct SliceError {
    kind: SliceErrorKind,
    backtrace: Backtrace,
}

/// The private kind behind [`SliceError`]; callers probe it through the
/// `is_*` predicates instead of matching on it.
#[derive(Debug)]
enum SliceErrorKind {
    /// A caller-supplied argument was invalid (negative depth, empty root list).
    InvalidArgument(String),
    /// The root file is not part of the loaded workspace.
    NotFound(String),
    /// The enclosing workspace could not be brought into an analysis
    /// database.
    WorkspaceLoad(Box<dyn std::error::Error + Send + Sync>),
    /// The caller's cancellation token was triggered.
    Cancelled,
    /// The semantic surface violated its contract.
    Internal(String),
}

impl SliceError {
    /// Creates an error for an invalid caller-supplied argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: SliceErrorKind::InvalidArgument(message.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates an error for a root file that is not in the workspace.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self {
            kind: SliceErrorKind::NotFound(path.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Wraps a loader failure as the workspace-load kind.
    pub fn workspace_load(
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind: SliceErrorKind::WorkspaceLoad(err.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates an error for an observed cancellation.
    pub fn cancelled() -> Self {
        Self {
            kind: SliceErrorKind::Cancelled,
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates an error for a semantic-surface contract violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SliceErrorKind::Internal(message.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// Returns true if this error is due to an invalid argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind, SliceErrorKind::InvalidArgument(_))
    }

    /// Returns true if this error is due to a missing root file.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, SliceErrorKind::NotFound(_))
    }

    /// Returns true if the workspace could not be loaded.
    pub fn is_workspace_load(&self) -> bool {
        matches!(self.kind, SliceErrorKind::WorkspaceLoad(_))
    }

    /// Returns true if this error is due to cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, SliceErrorKind::Cancelled)
    }

    /// Returns true if this error is due to a contract violation.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, SliceErrorKind::Internal(_))
    }

    /// The backtrace captured at construction.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for SliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SliceErrorKind::InvalidArgument(message) => {
                write!(f, "invalid argument: {message}")
            }
            SliceErrorKind::NotFound(path) => {
                write!(f, "root file '{path}' not found in workspace")
            }
            SliceErrorKind::WorkspaceLoad(err) => {
                write!(f, "could not load workspace: {err}")
            }
            SliceErrorKind::Cancelled => {
                write!(f, "extraction cancelled")
            }
            SliceErrorKind::Internal(message) => {
                write!(f, "internal error: {message}")
            }
        }
    }
}

impl std::error::Error for SliceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SliceErrorKind::WorkspaceLoad(err) => Some(err.as_ref()),
            SliceErrorKind::InvalidArgument(_)
            | SliceErrorKind::NotFound(_)
            | SliceErrorKind::Cancelled
            | SliceErrorKind::Internal(_) => None,
        }
    }
}
