//! `geosync sync` – run the full pipeline over every tracked page.

use anyhow::{bail, Result};
use geosync_core::browser::LazyChromeDriver;
use geosync_core::config::GeosyncConfig;
use geosync_core::resolver::HttpPageResolver;
use geosync_core::runner::{ArtifactOutcome, RunOutcome, SyncRunner};

pub async fn run_sync(cfg: GeosyncConfig, fail_on_mismatch: bool) -> Result<()> {
    let resolver = HttpPageResolver::new(&cfg.browser.user_agent, cfg.identity, cfg.checksum);
    let driver = LazyChromeDriver::new(cfg.browser.clone());
    let report_path = cfg.report_path.clone();

    let outcome = SyncRunner::new(cfg, resolver, driver).run().await?;
    print_summary(&outcome);
    println!("report: {}", report_path.display());

    check_outcome(&outcome, fail_on_mismatch)
}

/// Exit status of a run that got through every page.
/// Pages skipped under `--continue-on-error` always fail the command.
fn check_outcome(outcome: &RunOutcome, fail_on_mismatch: bool) -> Result<()> {
    let c = outcome.counts();
    if c.failed_pages > 0 {
        bail!("{} page(s) failed; see the report for details", c.failed_pages);
    }
    if fail_on_mismatch && c.mismatched + c.failed > 0 {
        bail!("one or more artifacts failed verification");
    }
    Ok(())
}

fn status_line(outcome: &RunOutcome) -> &'static str {
    if outcome.has_page_failures() {
        "page failures"
    } else if outcome.marker_written {
        "no changes"
    } else {
        "changes present"
    }
}

fn print_summary(outcome: &RunOutcome) {
    for page in &outcome.pages {
        println!("{}", page.page_url);
        if let Some(reason) = &page.failure {
            println!("  page failed: {reason}");
        }
        for artifact in &page.artifacts {
            let outcome_text = match &artifact.outcome {
                ArtifactOutcome::Verified { output } => format!("verified -> {}", output.display()),
                other => other.to_string(),
            };
            println!("  {:<5} {}", artifact.descriptor.label, outcome_text);
        }
    }

    let c = outcome.counts();
    println!(
        "{} skipped, {} verified, {} mismatched, {} failed",
        c.skipped, c.verified, c.mismatched, c.failed
    );
    println!("{}", status_line(outcome));
}
