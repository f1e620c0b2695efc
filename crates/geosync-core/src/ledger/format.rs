//! Line-oriented ledger format.
//!
//! Each entry is two lines:
//!
//! ```text
//! DownloadLink: <identity>
//! webSHA1SUM: <hash>
//! ```
//!
//! Blank lines and unrecognized lines are ignored on read, so files written by
//! older downloaders (which interleaved other log lines) still load. A link line
//! not immediately followed by a hash line is dropped.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::artifact::ArtifactIdentity;
use crate::checksum::normalize_hex;

pub(super) const IDENTITY_KEY: &str = "DownloadLink: ";
pub(super) const HASH_KEY: &str = "webSHA1SUM: ";

/// Parse ledger text into identity → hash. Later entries win. Hashes are
/// lowercased so entries written in upper case still match published hashes.
pub(super) fn parse(text: &str) -> BTreeMap<ArtifactIdentity, String> {
    let mut entries = BTreeMap::new();
    let mut lines = text.lines().map(str::trim_end).peekable();
    while let Some(line) = lines.next() {
        let Some(identity) = line.strip_prefix(IDENTITY_KEY) else {
            continue;
        };
        let identity = identity.trim();
        let Some(hash) = lines.peek().and_then(|next| next.strip_prefix(HASH_KEY)) else {
            continue;
        };
        let hash = normalize_hex(hash);
        lines.next();
        if identity.is_empty() || hash.is_empty() {
            continue;
        }
        entries.insert(ArtifactIdentity::new(identity), hash);
    }
    entries
}

/// Render entries in identity order.
pub(super) fn render(entries: &BTreeMap<ArtifactIdentity, String>) -> String {
    let mut out = String::new();
    for (identity, hash) in entries {
        let _ = writeln!(out, "{IDENTITY_KEY}{identity}");
        let _ = writeln!(out, "{HASH_KEY}{hash}");
    }
    out
}
