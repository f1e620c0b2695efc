//! Field extraction from a vendor download page.
//!
//! Tolerant, local scanning instead of a full DOM: the page is cut into
//! `div.card` blocks, the block whose text carries the artifact label holds
//! the `<dt>SHA1SUM</dt><dd>…</dd>` pair, and the download link is the first
//! anchor whose href ends with the artifact suffix.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::ResolveError;
use crate::artifact::{file_name_from_url, ArtifactDescriptor, ArtifactIdentity, IdentityMode};
use crate::checksum::{is_hex_digest, normalize_hex, ChecksumAlgorithm};
use crate::config::{ArtifactSpec, PageSpec};

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("static href pattern")
    })
}

fn card_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<div\b[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?card(?:\s[^"']*)?["']"#)
            .expect("static card pattern")
    })
}

fn checksum_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)<dt\b[^>]*>\s*(SHA1SUM|SHA256SUM)\s*</dt>\s*<dd\b[^>]*>\s*([^<]*?)\s*</dd>",
        )
        .expect("static checksum pattern")
    })
}

fn checksum_heading(algorithm: ChecksumAlgorithm) -> &'static str {
    match algorithm {
        ChecksumAlgorithm::Sha1 => "SHA1SUM",
        ChecksumAlgorithm::Sha256 => "SHA256SUM",
    }
}

/// First href in `html` ending with `suffix`, with `&amp;` decoded.
fn find_link(html: &str, suffix: &str) -> Option<String> {
    href_pattern()
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .find(|href| {
            let path = href.split(['?', '#']).next().unwrap_or(href);
            path.ends_with(suffix)
        })
}

/// `div.card` blocks in document order; each runs to the start of the next.
fn cards(html: &str) -> Vec<&str> {
    let starts: Vec<usize> = card_pattern().find_iter(html).map(|m| m.start()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(html.len());
            &html[start..end]
        })
        .collect()
}

/// Published checksum in the first card mentioning `label`.
fn find_checksum(html: &str, label: &str, algorithm: ChecksumAlgorithm) -> Option<String> {
    let heading = checksum_heading(algorithm);
    cards(html)
        .into_iter()
        .filter(|card| card.contains(label))
        .find_map(|card| {
            checksum_pattern()
                .captures_iter(card)
                .filter(|c| c.get(1).is_some_and(|h| h.as_str().eq_ignore_ascii_case(heading)))
                .filter_map(|c| c.get(2))
                .map(|m| normalize_hex(m.as_str()))
                .find(|hash| is_hex_digest(hash, algorithm))
        })
}

fn descriptor_for(
    html: &str,
    base: &Url,
    spec: &ArtifactSpec,
    identity: IdentityMode,
    algorithm: ChecksumAlgorithm,
) -> Result<ArtifactDescriptor, ResolveError> {
    let href = find_link(html, &spec.suffix).ok_or_else(|| ResolveError::MissingLink {
        suffix: spec.suffix.clone(),
    })?;
    let download_url = base
        .join(&href)
        .map_err(|source| ResolveError::InvalidUrl {
            url: href.clone(),
            source,
        })?
        .to_string();
    let expected_hash =
        find_checksum(html, &spec.label, algorithm).ok_or_else(|| ResolveError::MissingChecksum {
            label: spec.label.clone(),
        })?;
    let file_name = file_name_from_url(&download_url).ok_or_else(|| ResolveError::MissingFileName {
        url: download_url.clone(),
    })?;

    Ok(ArtifactDescriptor {
        identity: ArtifactIdentity::from_url(&download_url, identity),
        download_url,
        expected_hash,
        label: spec.label.clone(),
        link_suffix: spec.suffix.clone(),
        file_name,
    })
}

/// Build one descriptor per configured artifact of `page` from its HTML.
/// Hashes come out normalized to lowercase hex.
pub fn extract_artifacts(
    html: &str,
    page: &PageSpec,
    identity: IdentityMode,
    algorithm: ChecksumAlgorithm,
) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
    let base = Url::parse(&page.url).map_err(|source| ResolveError::InvalidUrl {
        url: page.url.clone(),
        source,
    })?;
    page.artifacts
        .iter()
        .map(|spec| descriptor_for(html, &base, spec, identity, algorithm))
        .collect()
}
