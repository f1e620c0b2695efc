//! Parallel verification of the artifacts landed for one page.

use std::path::PathBuf;

use crate::checksum::ChecksumAlgorithm;

use super::{process, ArtifactError, Verification};

/// One compressed file and the hash its decompressed content must have.
#[derive(Debug, Clone)]
pub struct VerifyJob {
    pub compressed: PathBuf,
    pub expected_hash: String,
}

/// Runs [`process`] for every job on the blocking pool and joins all of them
/// before returning. Results are in job order; one job failing never cancels
/// its siblings.
pub async fn verify_batch(
    jobs: Vec<VerifyJob>,
    algorithm: ChecksumAlgorithm,
) -> Vec<Result<Verification, ArtifactError>> {
    let mut join_set = tokio::task::JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        join_set.spawn_blocking(move || {
            (index, process(&job.compressed, &job.expected_hash, algorithm))
        });
    }

    let mut results: Vec<Option<Result<Verification, ArtifactError>>> =
        std::iter::repeat_with(|| None).take(join_set.len()).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => tracing::warn!("verification task join: {}", e),
        }
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(ArtifactError::Worker("task panicked or was cancelled".into())))
        })
        .collect()
}
