//! Hash ledger: last verified digest per artifact identity.
//!
//! Loaded once at run start (a missing file means no prior knowledge),
//! updated in memory only after an artifact verifies end to end, and
//! written back once at run end as a full overwrite.

mod format;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifact::ArtifactIdentity;

/// Ledger could not be read or written. Fatal for the run, since skip
/// decisions depend on it.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashLedger {
    entries: BTreeMap<ArtifactIdentity, String>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ledger text in the two-line `DownloadLink:` / `webSHA1SUM:` layout.
    pub fn parse(text: &str) -> Self {
        Self {
            entries: format::parse(text),
        }
    }

    /// Load from disk. A missing file yields an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let ledger = Self::parse(&text);
                tracing::debug!(path = %path.display(), entries = ledger.len(), "loaded hash ledger");
                Ok(ledger)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no hash ledger yet; every artifact will be fetched");
                Ok(Self::new())
            }
            Err(source) => Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Overwrite `path` with the current entries. Writes a sibling temp file and
    /// renames it into place so a crash never leaves a truncated ledger.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let write_err = |source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(self.render().as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        tracing::debug!(path = %path.display(), entries = self.len(), "saved hash ledger");
        Ok(())
    }

    pub fn render(&self) -> String {
        format::render(&self.entries)
    }

    /// Last verified hash for `identity`.
    pub fn get(&self, identity: &ArtifactIdentity) -> Option<&str> {
        self.entries.get(identity).map(String::as_str)
    }

    /// Record a hash confirmed against a decompressed local file.
    pub fn record_verified(&mut self, identity: ArtifactIdentity, hash: String) {
        self.entries.insert(identity, hash);
    }

    /// Drop the entry for an artifact whose local copy is no longer trustworthy.
    pub fn forget(&mut self, identity: &ArtifactIdentity) -> Option<String> {
        self.entries.remove(identity)
    }

    /// Keep only identities in `live`; returns how many entries were pruned.
    pub fn retain_identities(&mut self, live: &BTreeSet<ArtifactIdentity>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|identity, _| live.contains(identity));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactIdentity, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
