//! Sync orchestration across all tracked pages.
//!
//! Pages run one at a time: resolve, decide per artifact, download only what
//! changed, verify the landed files in parallel, then record. The hash ledger
//! is loaded once and flushed once; the outcome log is opened once and closed
//! once. After the last page the "no changes" marker is written when every
//! artifact was skipped, and removed otherwise.

mod outcome;
mod report;

pub use outcome::{ArtifactOutcome, ArtifactReport, OutcomeCounts, PageReport, RunOutcome};
pub use report::OutcomeLog;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::artifact::{stable_path_for, ArtifactDescriptor, ArtifactIdentity};
use crate::browser::{BrowserDriver, LinkTarget};
use crate::change::{decide, Decision};
use crate::config::{GeosyncConfig, PageSpec};
use crate::coordinator::{DownloadCoordinator, DownloadRequest};
use crate::error::{PageError, SyncError};
use crate::ledger::HashLedger;
use crate::resolver::DescriptorResolver;
use crate::verify::{verify_batch, Verification, VerifyJob};

/// Result of one page: its report plus the page-level error that ended it.
struct PageRun {
    report: PageReport,
    error: Option<PageError>,
}

pub struct SyncRunner<R, D> {
    config: GeosyncConfig,
    resolver: R,
    driver: D,
}

impl<R, D> SyncRunner<R, D>
where
    R: DescriptorResolver,
    D: BrowserDriver,
{
    pub fn new(config: GeosyncConfig, resolver: R, driver: D) -> Self {
        Self {
            config,
            resolver,
            driver,
        }
    }

    /// Process every configured page.
    ///
    /// Page-level failures abort the run unless `continue_on_page_error` is
    /// set; the ledger is flushed either way with prior entries plus what was
    /// verified before the failure. Artifact-level failures and mismatches are
    /// reported in the returned outcome and never abort.
    pub async fn run(&mut self) -> Result<RunOutcome, SyncError> {
        let output_dir = self.config.output_dir.clone();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| SyncError::io("create output dir", &output_dir, e))?;

        let ledger_path = self.config.ledger_path.clone();
        let mut ledger = HashLedger::load(&ledger_path)?;

        let report_path = self.config.report_path.clone();
        let mut log = OutcomeLog::create(&report_path)
            .map_err(|e| SyncError::io("create outcome log", &report_path, e))?;

        let coordinator = DownloadCoordinator::new(self.config.page_timeout());
        let mut outcome = RunOutcome::default();
        let mut live = BTreeSet::new();
        let mut all_resolved = true;
        let mut fatal = None;

        let pages = self.config.pages.clone();
        tracing::info!(pages = pages.len(), ledger_entries = ledger.len(), "sync started");

        for page in &pages {
            let PageRun { mut report, error } = self
                .sync_page(page, &coordinator, &mut ledger, &mut live)
                .await;

            for artifact in &report.artifacts {
                log.record(&page.url, &artifact.descriptor, &artifact.outcome)
                    .map_err(|e| SyncError::io("write outcome log", &report_path, e))?;
            }

            let Some(err) = error else {
                outcome.pages.push(report);
                continue;
            };

            tracing::error!(page = %page.url, "{}", err);
            if matches!(err, PageError::Resolve { .. }) {
                all_resolved = false;
            }
            let reason = err.to_string();
            log.page_failure(&page.url, &reason)
                .map_err(|e| SyncError::io("write outcome log", &report_path, e))?;
            report.failure = Some(reason);
            outcome.pages.push(report);

            if !self.config.continue_on_page_error {
                all_resolved = false;
                fatal = Some(err);
                break;
            }
        }

        // Identities seen this run are only complete when every page resolved.
        if all_resolved {
            outcome.pruned = ledger.retain_identities(&live);
            if outcome.pruned > 0 {
                tracing::info!(pruned = outcome.pruned, "dropped ledger entries no longer published");
            }
        }
        ledger.save(&ledger_path)?;
        log.finish()
            .map_err(|e| SyncError::io("close outcome log", &report_path, e))?;

        if let Some(err) = fatal {
            // A marker from an earlier quiet run must not outlive an aborted one.
            if let Err(e) = update_marker(&self.config.marker_path, false) {
                tracing::warn!("{}", e);
            }
            return Err(err.into());
        }

        outcome.marker_written = update_marker(&self.config.marker_path, outcome.all_skipped())?;
        let counts = outcome.counts();
        tracing::info!(
            skipped = counts.skipped,
            verified = counts.verified,
            mismatched = counts.mismatched,
            failed = counts.failed,
            failed_pages = counts.failed_pages,
            changed = outcome.any_changed(),
            "sync finished"
        );
        Ok(outcome)
    }

    async fn sync_page(
        &mut self,
        page: &PageSpec,
        coordinator: &DownloadCoordinator,
        ledger: &mut HashLedger,
        live: &mut BTreeSet<ArtifactIdentity>,
    ) -> PageRun {
        let mut report = PageReport::new(&page.url);
        let descriptors = match self.resolver.resolve(page).await {
            Ok(descriptors) => descriptors,
            Err(source) => {
                return PageRun {
                    report,
                    error: Some(PageError::Resolve {
                        page: page.url.clone(),
                        source,
                    }),
                }
            }
        };

        let mut outcomes: Vec<Option<ArtifactOutcome>> = vec![None; descriptors.len()];
        let mut changed = Vec::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            live.insert(descriptor.identity.clone());
            match decide(&descriptor.identity, &descriptor.expected_hash, ledger) {
                Decision::Skip => outcomes[i] = Some(ArtifactOutcome::Skipped),
                Decision::Fetch => changed.push(i),
            }
        }
        tracing::debug!(
            page = %page.url,
            artifacts = descriptors.len(),
            changed = changed.len(),
            "change detection done"
        );

        let error = self
            .fetch_and_verify(page, &descriptors, changed, coordinator, ledger, &mut outcomes)
            .await;

        for (descriptor, outcome) in descriptors.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| ArtifactOutcome::Failed {
                reason: error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "not processed".to_string()),
            });
            trace_outcome(&page.url, &descriptor, &outcome);
            report.artifacts.push(ArtifactReport {
                descriptor,
                outcome,
            });
        }
        PageRun { report, error }
    }

    /// Download and verify the artifacts at `pending`, re-triggering
    /// mismatched ones up to `mismatch_retries` times. Fills `outcomes` for
    /// every artifact it finishes; a page-level error leaves the rest empty.
    async fn fetch_and_verify(
        &mut self,
        page: &PageSpec,
        descriptors: &[ArtifactDescriptor],
        mut pending: Vec<usize>,
        coordinator: &DownloadCoordinator,
        ledger: &mut HashLedger,
        outcomes: &mut [Option<ArtifactOutcome>],
    ) -> Option<PageError> {
        let dir = self.config.output_dir.as_path();
        let mut attempt = 0u32;

        while !pending.is_empty() {
            for &i in &pending {
                remove_stale(&descriptors[i].compressed_path(dir));
            }
            let links: Vec<LinkTarget> = pending
                .iter()
                .map(|&i| LinkTarget {
                    label: descriptors[i].label.clone(),
                    href_suffix: descriptors[i].link_suffix.clone(),
                })
                .collect();
            let request = DownloadRequest {
                page_url: &page.url,
                download_dir: dir,
                links: &links,
            };
            if let Err(e) = coordinator.run(&mut self.driver, request).await {
                return Some(e);
            }

            let jobs = pending
                .iter()
                .map(|&i| VerifyJob {
                    compressed: descriptors[i].compressed_path(dir),
                    expected_hash: descriptors[i].expected_hash.clone(),
                })
                .collect();
            let results = verify_batch(jobs, self.config.checksum).await;

            let mut retry = Vec::new();
            for (i, result) in pending.iter().copied().zip(results) {
                let descriptor = &descriptors[i];
                outcomes[i] = Some(match result {
                    Ok(Verification::Verified { output }) => {
                        match self.settle_output(output) {
                            Ok(output) => {
                                ledger.record_verified(
                                    descriptor.identity.clone(),
                                    descriptor.expected_hash.clone(),
                                );
                                ArtifactOutcome::Verified { output }
                            }
                            Err(e) => {
                                ledger.forget(&descriptor.identity);
                                ArtifactOutcome::Failed {
                                    reason: e.to_string(),
                                }
                            }
                        }
                    }
                    Ok(Verification::Mismatch { output, actual }) => {
                        if attempt < self.config.mismatch_retries {
                            tracing::warn!(
                                identity = %descriptor.identity,
                                attempt = attempt + 1,
                                "checksum mismatch; downloading again"
                            );
                            retry.push(i);
                            continue;
                        }
                        ledger.forget(&descriptor.identity);
                        ArtifactOutcome::Mismatch { output, actual }
                    }
                    Err(e) => {
                        ledger.forget(&descriptor.identity);
                        ArtifactOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                });
            }
            pending = retry;
            attempt += 1;
        }
        None
    }

    /// Move a verified output to its edition-free name when `stable_names` is set.
    fn settle_output(&self, output: PathBuf) -> Result<PathBuf, SyncError> {
        if !self.config.stable_names {
            return Ok(output);
        }
        let stable = stable_path_for(&output);
        if stable == output {
            return Ok(output);
        }
        std::fs::rename(&output, &stable)
            .map_err(|e| SyncError::io("rename to stable name", &stable, e))?;
        tracing::debug!(from = %output.display(), to = %stable.display(), "stable name");
        Ok(stable)
    }
}

/// Remove a leftover compressed file so the browser saves under the expected
/// name instead of a de-duplicated one.
fn remove_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove stale download: {}", e),
    }
}

/// Write the empty marker when nothing changed; otherwise make sure none is left over.
fn update_marker(path: &Path, all_skipped: bool) -> Result<bool, SyncError> {
    if all_skipped {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::io("create marker dir", parent, e))?;
        }
        std::fs::File::create(path).map_err(|e| SyncError::io("write marker", path, e))?;
        tracing::info!(path = %path.display(), "no changes; marker written");
        return Ok(true);
    }
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale no-changes marker"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::io("remove marker", path, e)),
    }
    Ok(false)
}

fn trace_outcome(page: &str, descriptor: &ArtifactDescriptor, outcome: &ArtifactOutcome) {
    match outcome {
        ArtifactOutcome::Skipped | ArtifactOutcome::Verified { .. } => tracing::info!(
            page,
            identity = %descriptor.identity,
            link = %descriptor.download_url,
            outcome = %outcome,
            "artifact"
        ),
        ArtifactOutcome::Mismatch { .. } | ArtifactOutcome::Failed { .. } => tracing::warn!(
            page,
            identity = %descriptor.identity,
            link = %descriptor.download_url,
            expected = %descriptor.expected_hash,
            outcome = %outcome,
            "artifact"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_written_only_when_all_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("flags").join("no-updates.flag");

        assert!(update_marker(&marker, true).unwrap());
        assert!(marker.exists());
        assert_eq!(std::fs::metadata(&marker).unwrap().len(), 0);

        assert!(!update_marker(&marker, false).unwrap());
        assert!(!marker.exists());
        // Removing an absent marker is fine.
        assert!(!update_marker(&marker, false).unwrap());
    }

    #[test]
    fn remove_stale_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbip-asn-lite-2024-06.mmdb.gz");
        remove_stale(&path);
        std::fs::write(&path, b"old").unwrap();
        remove_stale(&path);
        assert!(!path.exists());
    }
}
