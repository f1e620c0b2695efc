//! Page fetch over HTTP (libcurl), followed by field extraction.

use async_trait::async_trait;
use std::time::Duration;

use super::{extract_artifacts, DescriptorResolver, ResolveError};
use crate::artifact::{ArtifactDescriptor, IdentityMode};
use crate::checksum::ChecksumAlgorithm;
use crate::config::PageSpec;

/// Resolves descriptors by downloading the page HTML and reading the link
/// and checksum fields out of it.
#[derive(Debug, Clone)]
pub struct HttpPageResolver {
    user_agent: String,
    identity: IdentityMode,
    algorithm: ChecksumAlgorithm,
}

impl HttpPageResolver {
    pub fn new(user_agent: &str, identity: IdentityMode, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            identity,
            algorithm,
        }
    }
}

#[async_trait]
impl DescriptorResolver for HttpPageResolver {
    async fn resolve(&self, page: &PageSpec) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        let url = page.url.clone();
        let user_agent = self.user_agent.clone();
        let html = tokio::task::spawn_blocking(move || fetch_page(&url, &user_agent))
            .await
            .map_err(|e| ResolveError::Worker(e.to_string()))??;
        tracing::debug!(page = %page.url, bytes = html.len(), "fetched download page");
        extract_artifacts(&html, page, self.identity, self.algorithm)
    }
}

/// GET `url` and return the body as text. Follows redirects; requires a 2xx status.
/// Runs in the current thread; call from `spawn_blocking` in async code.
pub fn fetch_page(url: &str, user_agent: &str) -> Result<String, ResolveError> {
    let http = |source| ResolveError::Http {
        url: url.to_string(),
        source,
    };

    let mut body: Vec<u8> = Vec::new();
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(http)?;
    easy.follow_location(true).map_err(http)?;
    easy.max_redirections(10).map_err(http)?;
    easy.useragent(user_agent).map_err(http)?;
    easy.accept_encoding("").map_err(http)?;
    easy.connect_timeout(Duration::from_secs(15)).map_err(http)?;
    easy.timeout(Duration::from_secs(30)).map_err(http)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(http)?;
        transfer.perform().map_err(http)?;
    }

    let code = easy.response_code().map_err(http)?;
    if !(200..300).contains(&code) {
        return Err(ResolveError::Status {
            url: url.to_string(),
            code,
        });
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
