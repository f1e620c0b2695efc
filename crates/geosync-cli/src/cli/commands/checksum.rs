//! `geosync checksum` – print the digest of a file.

use anyhow::{Context, Result};
use geosync_core::checksum::{self, ChecksumAlgorithm};
use std::path::Path;

pub async fn run_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<()> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || checksum::digest_path(&owned, algorithm))
        .await?
        .with_context(|| format!("hash {}", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
