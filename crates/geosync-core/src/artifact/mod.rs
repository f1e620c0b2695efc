//! Artifact data model: identity, descriptor, and expected local names.
//!
//! A descriptor is produced fresh from the live page on every run and is
//! never persisted; only its verified hash survives, keyed by identity, in
//! the hash ledger.

mod naming;

pub use naming::{file_name_from_url, sanitize_file_name, strip_edition};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Compression suffix every tracked artifact carries.
pub const GZIP_SUFFIX: &str = ".gz";

/// How an artifact identity is derived from its download URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// The raw download URL. A new monthly edition is a new identity.
    #[default]
    Url,
    /// The download URL with its `-YYYY-MM` edition tag removed, so a new
    /// edition with an unchanged checksum is still skipped.
    Edition,
}

/// Stable join key between ledger, descriptor, and local files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity(String);

impl ArtifactIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Identity for `download_url` under the given mode.
    pub fn from_url(download_url: &str, mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::Url => Self(download_url.to_string()),
            IdentityMode::Edition => Self(strip_edition(download_url)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One downloadable compressed file as seen on the page this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub identity: ArtifactIdentity,
    /// Absolute download URL of the compressed file.
    pub download_url: String,
    /// Published digest of the decompressed content, lowercase hex.
    pub expected_hash: String,
    /// Card label the checksum was read from (e.g. `MMDB`).
    pub label: String,
    /// Suffix the download link ends with; used to pick the link to click.
    pub link_suffix: String,
    /// Name the browser saves the compressed file under.
    pub file_name: String,
}

impl ArtifactDescriptor {
    /// Where the browser lands the compressed file.
    pub fn compressed_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

/// Sibling path of a compressed file with the `.gz` suffix removed.
/// Files without the suffix get `.out` appended so input and output never alias.
pub fn decompressed_path_for(compressed: &Path) -> PathBuf {
    let name = compressed
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = match name.strip_suffix(GZIP_SUFFIX) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => format!("{name}.out"),
    };
    compressed.with_file_name(stripped)
}

/// Sibling path with the `-YYYY-MM` edition tag dropped from the file name.
/// Returns `path` unchanged when the name carries no tag.
pub fn stable_path_for(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(strip_edition(&name.to_string_lossy())),
        None => path.to_path_buf(),
    }
}
