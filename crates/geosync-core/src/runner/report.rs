//! Human-readable per-artifact outcome log for audit.
//!
//! Created (truncated) once at run start, written through by the runner, and
//! flushed and closed once at run end.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::outcome::ArtifactOutcome;
use crate::artifact::ArtifactDescriptor;

pub struct OutcomeLog {
    writer: BufWriter<File>,
}

impl OutcomeLog {
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// One record per artifact: page, identity, link, expected hash, outcome.
    pub fn record(
        &mut self,
        page_url: &str,
        descriptor: &ArtifactDescriptor,
        outcome: &ArtifactOutcome,
    ) -> io::Result<()> {
        writeln!(self.writer, "Page: {page_url}")?;
        writeln!(self.writer, "Identity: {}", descriptor.identity)?;
        writeln!(self.writer, "DownloadLink: {}", descriptor.download_url)?;
        writeln!(self.writer, "Expected: {}", descriptor.expected_hash)?;
        if let ArtifactOutcome::Verified { output } | ArtifactOutcome::Mismatch { output, .. } = outcome {
            writeln!(self.writer, "Output: {}", output.display())?;
        }
        writeln!(self.writer, "Outcome: {outcome}")?;
        writeln!(self.writer)
    }

    /// Page-level failure that left some or all of its artifacts unprocessed.
    pub fn page_failure(&mut self, page_url: &str, reason: &str) -> io::Result<()> {
        writeln!(self.writer, "Page: {page_url}")?;
        writeln!(self.writer, "Outcome: page failed: {reason}")?;
        writeln!(self.writer)
    }

    /// Flush buffered records and sync to disk.
    pub fn finish(self) -> io::Result<()> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::artifact::{ArtifactIdentity, IdentityMode};

    fn descriptor() -> ArtifactDescriptor {
        let url = "https://download.db-ip.com/free/dbip-country-lite-2024-06.csv.gz";
        ArtifactDescriptor {
            identity: ArtifactIdentity::from_url(url, IdentityMode::Edition),
            download_url: url.to_string(),
            expected_hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            label: "CSV".to_string(),
            link_suffix: ".csv.gz".to_string(),
            file_name: "dbip-country-lite-2024-06.csv.gz".to_string(),
        }
    }

    #[test]
    fn records_every_field_and_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("downloads.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old run\n").unwrap();

        let mut log = OutcomeLog::create(&path).unwrap();
        let page = "https://db-ip.com/db/download/ip-to-country-lite";
        log.record(page, &descriptor(), &ArtifactOutcome::Skipped).unwrap();
        log.record(
            page,
            &descriptor(),
            &ArtifactOutcome::Verified {
                output: PathBuf::from("out/dbip-country-lite-2024-06.csv"),
            },
        )
        .unwrap();
        log.page_failure("https://db-ip.com/db/download/ip-to-asn-lite", "timed out")
            .unwrap();
        log.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old run"));
        assert!(text.contains("Identity: https://download.db-ip.com/free/dbip-country-lite.csv.gz\n"));
        assert!(text.contains("DownloadLink: https://download.db-ip.com/free/dbip-country-lite-2024-06.csv.gz\n"));
        assert!(text.contains("Expected: 0123456789abcdef0123456789abcdef01234567\n"));
        assert!(text.contains("Outcome: skipped\n"));
        assert!(text.contains("Output: out/dbip-country-lite-2024-06.csv\nOutcome: verified\n"));
        assert!(text.contains("Outcome: page failed: timed out\n"));
    }
}
