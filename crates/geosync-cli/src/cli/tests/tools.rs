//! Tests for verify, checksum, and ledger subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use geosync_core::checksum::ChecksumAlgorithm;
use std::path::Path;

#[test]
fn cli_parse_verify_default_algorithm() {
    match parse(&[
        "geosync",
        "verify",
        "dbip-asn-lite-2024-06.mmdb.gz",
        "da39a3ee5e6b4b0d3255bfef95601890afd80709",
    ]) {
        CliCommand::Verify {
            compressed,
            expected_hash,
            algorithm,
        } => {
            assert_eq!(compressed, Path::new("dbip-asn-lite-2024-06.mmdb.gz"));
            assert_eq!(expected_hash, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
            assert_eq!(algorithm, ChecksumAlgorithm::Sha1);
        }
        _ => panic!("expected Verify"),
    }
}

#[test]
fn cli_parse_verify_requires_hash() {
    assert!(Cli::try_parse_from(["geosync", "verify", "x.gz"]).is_err());
}

#[test]
fn cli_parse_checksum_sha256() {
    match parse(&["geosync", "checksum", "/tmp/x.mmdb", "--algorithm", "sha256"]) {
        CliCommand::Checksum { path, algorithm } => {
            assert_eq!(path, Path::new("/tmp/x.mmdb"));
            assert_eq!(algorithm, ChecksumAlgorithm::Sha256);
        }
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_parse_checksum_rejects_unknown_algorithm() {
    assert!(
        Cli::try_parse_from(["geosync", "checksum", "/tmp/x", "--algorithm", "md5"])
            .is_err()
    );
}

#[test]
fn cli_parse_ledger() {
    match parse(&["geosync", "ledger", "--config", "cfg.toml"]) {
        CliCommand::Ledger { config } => {
            assert_eq!(config.as_deref(), Some(Path::new("cfg.toml")));
        }
        _ => panic!("expected Ledger"),
    }
}
