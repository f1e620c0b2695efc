//! Descriptor resolution: turn a tracked page into the artifacts it offers.
//!
//! The sync runner only depends on [`DescriptorResolver`]; the HTTP + HTML
//! implementation lives in [`HttpPageResolver`].

mod extract;
mod fetch;

pub use extract::extract_artifacts;
pub use fetch::HttpPageResolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::ArtifactDescriptor;
use crate::config::PageSpec;

/// Page fetch or field extraction failed. Fatal for the page.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("GET {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: curl::Error,
    },
    #[error("GET {url} returned HTTP {code}")]
    Status { url: String, code: u32 },
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("no download link ending in {suffix}")]
    MissingLink { suffix: String },
    #[error("no published checksum in the {label} card")]
    MissingChecksum { label: String },
    #[error("download link {url} has no file name")]
    MissingFileName { url: String },
    #[error("resolver task failed: {0}")]
    Worker(String),
}

/// Produces the artifact descriptors of one page.
#[async_trait]
pub trait DescriptorResolver: Send + Sync {
    async fn resolve(&self, page: &PageSpec) -> Result<Vec<ArtifactDescriptor>, ResolveError>;
}
