//! Page- and run-level error taxonomy.
//!
//! Artifact-level failures ([`crate::verify::ArtifactError`]) and checksum
//! mismatches are reported per artifact and never appear here.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::browser::AutomationError;
use crate::ledger::LedgerError;
use crate::resolver::ResolveError;

/// Failure that ends processing of one page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("resolve {page}: {source}")]
    Resolve {
        page: String,
        #[source]
        source: ResolveError,
    },
    #[error("browser automation failed on {page}: {source}")]
    Automation {
        page: String,
        #[source]
        source: AutomationError,
    },
    #[error("downloads on {page} timed out after {}s: {observed} of {expected} completed", .waited.as_secs())]
    DownloadTimeout {
        page: String,
        observed: usize,
        expected: usize,
        waited: Duration,
    },
}

/// Failure that ends the whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        SyncError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
