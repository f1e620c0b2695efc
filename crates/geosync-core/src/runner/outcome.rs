//! Per-artifact and aggregate results of a sync run.

use std::fmt;
use std::path::PathBuf;

use crate::artifact::ArtifactDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// Ledger already held the published hash.
    Skipped,
    /// Downloaded, decompressed to `output`, and hash confirmed.
    Verified { output: PathBuf },
    /// Downloaded and decompressed, but the content hash differs.
    /// `output` is kept for inspection.
    Mismatch { output: PathBuf, actual: String },
    /// Download, decompression, or hashing did not complete.
    Failed { reason: String },
}

impl ArtifactOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ArtifactOutcome::Skipped)
    }
}

impl fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactOutcome::Skipped => f.write_str("skipped"),
            ArtifactOutcome::Verified { .. } => f.write_str("verified"),
            ArtifactOutcome::Mismatch { actual, .. } => write!(f, "mismatch actual={actual}"),
            ArtifactOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub descriptor: ArtifactDescriptor,
    pub outcome: ArtifactOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct PageReport {
    pub page_url: String,
    pub artifacts: Vec<ArtifactReport>,
    /// Page-level failure (resolve, automation, timeout), if any.
    pub failure: Option<String>,
}

impl PageReport {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub skipped: usize,
    pub verified: usize,
    pub mismatched: usize,
    pub failed: usize,
    pub failed_pages: usize,
}

/// Everything one run observed, in page order.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub pages: Vec<PageReport>,
    /// Ledger entries dropped because their identity is no longer published.
    pub pruned: usize,
    /// Whether the "no changes" marker was written by this run.
    pub marker_written: bool,
}

impl RunOutcome {
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactReport> {
        self.pages.iter().flat_map(|p| p.artifacts.iter())
    }

    /// True when every artifact of every page was skipped and no page failed.
    /// Only then may downstream work be short-circuited.
    pub fn all_skipped(&self) -> bool {
        self.pages.iter().all(|p| p.failure.is_none())
            && self.artifacts().all(|a| a.outcome.is_skipped())
    }

    pub fn any_changed(&self) -> bool {
        !self.all_skipped()
    }

    /// True when a page ended early (only reachable with `continue_on_page_error`).
    pub fn has_page_failures(&self) -> bool {
        self.pages.iter().any(|p| p.failure.is_some())
    }

    pub fn has_mismatch(&self) -> bool {
        self.artifacts()
            .any(|a| matches!(a.outcome, ArtifactOutcome::Mismatch { .. }))
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts {
            failed_pages: self.pages.iter().filter(|p| p.failure.is_some()).count(),
            ..OutcomeCounts::default()
        };
        for report in self.artifacts() {
            match report.outcome {
                ArtifactOutcome::Skipped => counts.skipped += 1,
                ArtifactOutcome::Verified { .. } => counts.verified += 1,
                ArtifactOutcome::Mismatch { .. } => counts.mismatched += 1,
                ArtifactOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactIdentity, IdentityMode};

    fn report(outcome: ArtifactOutcome) -> ArtifactReport {
        let url = "https://download.db-ip.com/free/dbip-asn-lite-2024-06.mmdb.gz";
        ArtifactReport {
            descriptor: ArtifactDescriptor {
                identity: ArtifactIdentity::from_url(url, IdentityMode::Url),
                download_url: url.to_string(),
                expected_hash: "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
                label: "MMDB".to_string(),
                link_suffix: ".mmdb.gz".to_string(),
                file_name: "dbip-asn-lite-2024-06.mmdb.gz".to_string(),
            },
            outcome,
        }
    }

    fn page(outcomes: Vec<ArtifactOutcome>) -> PageReport {
        PageReport {
            page_url: "https://db-ip.com/db/download/ip-to-asn-lite".to_string(),
            artifacts: outcomes.into_iter().map(report).collect(),
            failure: None,
        }
    }

    #[test]
    fn all_skipped_requires_every_artifact_skipped() {
        let quiet = RunOutcome {
            pages: vec![page(vec![ArtifactOutcome::Skipped, ArtifactOutcome::Skipped])],
            ..RunOutcome::default()
        };
        assert!(quiet.all_skipped());
        assert!(!quiet.any_changed());
        assert!(!quiet.has_page_failures());

        let changed = RunOutcome {
            pages: vec![
                page(vec![ArtifactOutcome::Skipped]),
                page(vec![ArtifactOutcome::Verified {
                    output: PathBuf::from("out/x.mmdb"),
                }]),
            ],
            ..RunOutcome::default()
        };
        assert!(changed.any_changed());
    }

    #[test]
    fn page_failure_is_never_all_skipped() {
        let mut failed = page(vec![]);
        failed.failure = Some("timed out".to_string());
        let outcome = RunOutcome {
            pages: vec![page(vec![ArtifactOutcome::Skipped]), failed],
            ..RunOutcome::default()
        };
        assert!(!outcome.all_skipped());
        assert!(outcome.has_page_failures());
        assert_eq!(outcome.counts().failed_pages, 1);
    }

    #[test]
    fn counts_and_display() {
        let outcome = RunOutcome {
            pages: vec![page(vec![
                ArtifactOutcome::Skipped,
                ArtifactOutcome::Mismatch {
                    output: PathBuf::from("out/x.mmdb"),
                    actual: "ff".to_string(),
                },
                ArtifactOutcome::Failed {
                    reason: "gone".to_string(),
                },
            ])],
            ..RunOutcome::default()
        };
        let counts = outcome.counts();
        assert_eq!((counts.skipped, counts.verified, counts.mismatched, counts.failed), (1, 0, 1, 1));
        assert!(outcome.has_mismatch());

        let rendered: Vec<String> = outcome.artifacts().map(|a| a.outcome.to_string()).collect();
        assert_eq!(rendered, ["skipped", "mismatch actual=ff", "failed: gone"]);
    }
}
