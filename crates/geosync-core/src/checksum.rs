//! Streaming file digests (SHA-1 as published by the vendor, SHA-256 optional).

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

const BUF_SIZE: usize = 64 * 1024;

/// Digest algorithm used to verify decompressed artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Length of the hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Sha1 => 40,
            ChecksumAlgorithm::Sha256 => 64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    /// Fresh incremental hasher for this algorithm.
    pub fn hasher(self) -> StreamHasher {
        match self {
            ChecksumAlgorithm::Sha1 => StreamHasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(format!("unsupported checksum algorithm: {other}")),
        }
    }
}

/// Incremental hasher over either supported algorithm.
#[derive(Clone)]
pub enum StreamHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl StreamHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha1(h) => h.update(data),
            StreamHasher::Sha256(h) => h.update(data),
        }
    }

    /// Lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Sha1(h) => hex::encode(h.finalize()),
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Digest a reader to lowercase hex, in fixed-size chunks.
pub fn digest_reader<R: Read>(mut reader: R, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Compute the digest of a file and return it as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn digest_path(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let f = File::open(path)?;
    digest_reader(f, algorithm)
}

/// Canonical form of a published digest: surrounding whitespace removed, lowercase.
pub fn normalize_hex(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// True if `s` looks like a hex digest of the given algorithm.
pub fn is_hex_digest(s: &str, algorithm: ChecksumAlgorithm) -> bool {
    s.len() == algorithm.hex_len() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
