//! `geosync verify` – decompress a local artifact and check its digest.

use anyhow::{bail, Result};
use geosync_core::checksum::{is_hex_digest, normalize_hex, ChecksumAlgorithm};
use geosync_core::verify::{self, Verification};
use std::path::Path;

pub async fn run_verify(
    compressed: &Path,
    expected_hash: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<()> {
    let expected = normalize_hex(expected_hash);
    if !is_hex_digest(&expected, algorithm) {
        bail!("{expected_hash:?} is not a {algorithm} hex digest");
    }

    let input = compressed.to_path_buf();
    let verification =
        tokio::task::spawn_blocking(move || verify::process(&input, &expected, algorithm)).await??;

    match verification {
        Verification::Verified { output } => {
            println!("verified  {}", output.display());
            Ok(())
        }
        Verification::Mismatch { output, actual } => {
            bail!("checksum mismatch for {}: got {}", output.display(), actual)
        }
    }
}
