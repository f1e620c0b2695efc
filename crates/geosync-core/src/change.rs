//! Change detection: skip an artifact only when its published hash equals
//! the last verified hash recorded for the same identity.

use crate::artifact::ArtifactIdentity;
use crate::ledger::HashLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Ledger already holds this exact hash; nothing to download.
    Skip,
    /// No entry, or the published hash differs.
    Fetch,
}

/// Exact string comparison against the ledger. Callers pass `expected_hash`
/// in canonical lowercase (descriptors are normalized at resolution time).
pub fn decide(identity: &ArtifactIdentity, expected_hash: &str, ledger: &HashLedger) -> Decision {
    match ledger.get(identity) {
        Some(previous) if previous == expected_hash => Decision::Skip,
        _ => Decision::Fetch,
    }
}
