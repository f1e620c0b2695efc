//! CLI for geosync.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use geosync_core::checksum::ChecksumAlgorithm;
use geosync_core::config::{self, GeosyncConfig, PageSpec};
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_ledger, run_resolve, run_sync, run_verify};

/// Top-level CLI for geosync.
#[derive(Debug, Parser)]
#[command(name = "geosync")]
#[command(
    about = "geosync: verified incremental sync of db-ip lite databases",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Check every tracked page, download what changed, and verify it.
    Sync {
        /// Config file to use instead of the XDG default.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Directory for downloads and decompressed databases.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Only process these page URLs (repeatable).
        #[arg(long = "page", value_name = "URL")]
        pages: Vec<String>,
        /// Per-page bound for the navigate/agree/click/wait sequence.
        #[arg(long, value_name = "N")]
        timeout_secs: Option<u64>,
        /// Record page failures and keep going instead of aborting; the command still exits 1.
        #[arg(long)]
        continue_on_error: bool,
        /// Exit non-zero if any artifact failed verification.
        #[arg(long)]
        fail_on_mismatch: bool,
    },

    /// Show what each page publishes and whether it would be downloaded.
    Resolve {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        #[arg(long = "page", value_name = "URL")]
        pages: Vec<String>,
    },

    /// Decompress a local `.gz` artifact and check it against a hash.
    Verify {
        /// Path to the compressed file.
        compressed: PathBuf,
        /// Expected digest of the decompressed content (hex).
        expected_hash: String,
        #[arg(long, default_value = "sha1")]
        algorithm: ChecksumAlgorithm,
    },

    /// Print the digest of a file.
    Checksum {
        path: PathBuf,
        #[arg(long, default_value = "sha1")]
        algorithm: ChecksumAlgorithm,
    },

    /// List the last verified hash of every tracked artifact.
    Ledger {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Sync {
                config,
                output_dir,
                pages,
                timeout_secs,
                continue_on_error,
                fail_on_mismatch,
            } => {
                let mut cfg = load_config(config.as_deref())?;
                if let Some(dir) = output_dir {
                    set_output_dir(&mut cfg, dir);
                }
                select_pages(&mut cfg, &pages);
                if let Some(secs) = timeout_secs {
                    cfg.page_timeout_secs = secs;
                }
                cfg.continue_on_page_error |= continue_on_error;
                cfg.validate()?;
                run_sync(cfg, fail_on_mismatch).await?;
            }
            CliCommand::Resolve { config, pages } => {
                let mut cfg = load_config(config.as_deref())?;
                select_pages(&mut cfg, &pages);
                run_resolve(&cfg).await?;
            }
            CliCommand::Verify {
                compressed,
                expected_hash,
                algorithm,
            } => run_verify(&compressed, &expected_hash, algorithm).await?,
            CliCommand::Checksum { path, algorithm } => run_checksum(&path, algorithm).await?,
            CliCommand::Ledger { config } => {
                let cfg = load_config(config.as_deref())?;
                run_ledger(&cfg)?;
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<GeosyncConfig> {
    let cfg = match path {
        Some(p) => config::load_from_path(p)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

/// Move the output dir, carrying along ledger and report paths that lived under it.
fn set_output_dir(cfg: &mut GeosyncConfig, dir: PathBuf) {
    let old = std::mem::replace(&mut cfg.output_dir, dir);
    for path in [&mut cfg.ledger_path, &mut cfg.report_path] {
        if let Ok(rest) = path.strip_prefix(&old) {
            *path = cfg.output_dir.join(rest);
        }
    }
}

/// Restrict to `urls`, keeping configured artifacts for known pages.
fn select_pages(cfg: &mut GeosyncConfig, urls: &[String]) {
    if urls.is_empty() {
        return;
    }
    cfg.pages = urls
        .iter()
        .map(|url| {
            cfg.pages
                .iter()
                .find(|p| &p.url == url)
                .cloned()
                .unwrap_or_else(|| PageSpec::with_default_artifacts(url))
        })
        .collect();
}

#[cfg(test)]
mod tests;
