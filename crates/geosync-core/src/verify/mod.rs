//! Decompress a downloaded `.gz` artifact next to itself and verify its digest.
//!
//! Pure function of (compressed path, expected hash) plus filesystem side
//! effects; no network I/O. Independent files can be processed in parallel
//! (see [`verify_batch`]).

mod batch;

pub use batch::{verify_batch, VerifyJob};

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifact::decompressed_path_for;
use crate::checksum::{self, ChecksumAlgorithm};

/// Outcome of a completed decompress + hash. A mismatch is a reported
/// failure, not an error: the decompressed file stays on disk for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified { output: PathBuf },
    Mismatch { output: PathBuf, actual: String },
}

impl Verification {
    pub fn output(&self) -> &Path {
        match self {
            Verification::Verified { output } | Verification::Mismatch { output, .. } => output,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Per-artifact failure. Never aborts sibling artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("compressed file not found: {path}")]
    Missing { path: PathBuf },
    #[error("decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("verification worker failed: {0}")]
    Worker(String),
}

/// Stream-decompress `compressed` to its sibling path without the `.gz`
/// suffix, then hash the result and compare it to `expected_hash`.
///
/// Output is written to `<output>.part` and renamed into place once the
/// stream is complete, so a failed decompression never leaves a truncated
/// file under the final name.
pub fn process(
    compressed: &Path,
    expected_hash: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<Verification, ArtifactError> {
    let output = decompressed_path_for(compressed);
    decompress(compressed, &output)?;

    let actual = checksum::digest_path(&output, algorithm).map_err(|source| ArtifactError::Hash {
        path: output.clone(),
        source,
    })?;

    if actual == expected_hash {
        tracing::debug!(path = %output.display(), hash = %actual, "checksum verified");
        Ok(Verification::Verified { output })
    } else {
        tracing::warn!(
            path = %output.display(),
            expected = %expected_hash,
            actual = %actual,
            "checksum mismatch; decompressed file kept for inspection"
        );
        Ok(Verification::Mismatch { output, actual })
    }
}

fn decompress(compressed: &Path, output: &Path) -> Result<u64, ArtifactError> {
    let input = File::open(compressed).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArtifactError::Missing {
            path: compressed.to_path_buf(),
        },
        _ => ArtifactError::Decompress {
            path: compressed.to_path_buf(),
            source: e,
        },
    })?;

    let mut part_name = output.as_os_str().to_owned();
    part_name.push(".part");
    let part = PathBuf::from(part_name);

    let result = (|| -> io::Result<u64> {
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        let mut writer = BufWriter::new(File::create(&part)?);
        let n = io::copy(&mut decoder, &mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        std::fs::rename(&part, output)?;
        Ok(n)
    })();

    match result {
        Ok(n) => {
            tracing::debug!(
                from = %compressed.display(),
                to = %output.display(),
                bytes = n,
                "decompressed"
            );
            Ok(n)
        }
        Err(source) => {
            let _ = std::fs::remove_file(&part);
            Err(ArtifactError::Decompress {
                path: compressed.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_gz(path: &Path, body: &[u8]) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(body).unwrap();
        enc.finish().unwrap();
    }

    fn sha1_hex(body: &[u8]) -> String {
        checksum::digest_reader(body, ChecksumAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn verified_roundtrip_restores_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0u8..=255).cycle().take(200 * 1024).collect();
        let gz = dir.path().join("dbip-city-lite-2024-06.mmdb.gz");
        write_gz(&gz, &body);

        let outcome = process(&gz, &sha1_hex(&body), ChecksumAlgorithm::Sha1).unwrap();
        let expected_out = dir.path().join("dbip-city-lite-2024-06.mmdb");
        assert_eq!(
            outcome,
            Verification::Verified {
                output: expected_out.clone()
            }
        );
        assert_eq!(std::fs::read(&expected_out).unwrap(), body);
        assert!(!dir.path().join("dbip-city-lite-2024-06.mmdb.part").exists());
    }

    #[test]
    fn single_byte_change_is_mismatch_and_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"1.0.0.0,1.0.0.255,AU\n".repeat(100);
        let mut altered = body.clone();
        altered[7] ^= 0x01;
        let gz = dir.path().join("dbip-country-lite.csv.gz");
        write_gz(&gz, &altered);

        let expected = sha1_hex(&body);
        match process(&gz, &expected, ChecksumAlgorithm::Sha1).unwrap() {
            Verification::Mismatch { output, actual } => {
                assert_eq!(actual, sha1_hex(&altered));
                assert_ne!(actual, expected);
                assert!(output.exists(), "mismatched file must stay for inspection");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = process(&dir.path().join("absent.mmdb.gz"), "00", ChecksumAlgorithm::Sha1)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
    }

    #[test]
    fn corrupt_gzip_is_decompress_error_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("broken.mmdb.gz");
        std::fs::write(&gz, b"definitely not gzip").unwrap();
        let err = process(&gz, "00", ChecksumAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, ArtifactError::Decompress { .. }));
        assert!(!dir.path().join("broken.mmdb").exists());
        assert!(!dir.path().join("broken.mmdb.part").exists());
    }

    #[test]
    fn sha256_is_supported() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("hello.txt.gz");
        write_gz(&gz, b"hello\n");
        let outcome = process(
            &gz,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03",
            ChecksumAlgorithm::Sha256,
        )
        .unwrap();
        assert!(outcome.is_verified());
    }
}
