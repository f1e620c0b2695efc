//! Configuration loaded from `~/.config/geosync/config.toml`.
//!
//! Every field has a default so a partial file (or none at all) yields a
//! working setup that tracks the three db-ip "lite" databases.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::IdentityMode;
use crate::checksum::ChecksumAlgorithm;

/// One downloadable file on a page: the label of the card holding its
/// checksum and the suffix its download link ends with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub label: String,
    pub suffix: String,
}

impl ArtifactSpec {
    pub fn new(label: &str, suffix: &str) -> Self {
        Self {
            label: label.to_string(),
            suffix: suffix.to_string(),
        }
    }
}

/// A tracked vendor download page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub url: String,
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<ArtifactSpec>,
}

impl PageSpec {
    /// Page with the default MMDB + CSV artifact pair.
    pub fn with_default_artifacts(url: &str) -> Self {
        Self {
            url: url.to_string(),
            artifacts: default_artifacts(),
        }
    }
}

fn default_artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::new("MMDB", ".mmdb.gz"),
        ArtifactSpec::new("CSV", ".csv.gz"),
    ]
}

fn default_pages() -> Vec<PageSpec> {
    [
        "https://db-ip.com/db/download/ip-to-asn-lite",
        "https://db-ip.com/db/download/ip-to-country-lite",
        "https://db-ip.com/db/download/ip-to-city-lite",
    ]
    .iter()
    .map(|url| PageSpec::with_default_artifacts(url))
    .collect()
}

/// Browser automation settings (`[browser]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome executable. Falls back to `$CHROME_PATH`, then `google-chrome` on `$PATH`.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    /// CSS selector of the license agreement checkbox.
    pub agree_selector: String,
    /// CSS selector shared by the download links; the artifact suffix is appended as `[href$=...]`.
    pub link_selector: String,
    /// Pause after ticking the agreement so page scripts can enable the links.
    pub settle_secs: u64,
    /// Pause between two link clicks on the same page.
    pub click_gap_secs: u64,
    /// Maximum wait for Chrome to print its DevTools endpoint.
    pub launch_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
                .to_string(),
            agree_selector: "#license_agree".to_string(),
            link_selector: "a.free_download_link".to_string(),
            settle_secs: 2,
            click_gap_secs: 5,
            launch_timeout_secs: 30,
        }
    }
}

impl BrowserConfig {
    /// Chrome binary to launch, in precedence order: config, `$CHROME_PATH`, `google-chrome`.
    pub fn resolved_chrome_path(&self) -> PathBuf {
        if let Some(p) = &self.chrome_path {
            return p.clone();
        }
        match std::env::var_os("CHROME_PATH") {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => PathBuf::from("google-chrome"),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn click_gap(&self) -> Duration {
        Duration::from_secs(self.click_gap_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs.max(1))
    }
}

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeosyncConfig {
    /// Directory the browser downloads into and archives are decompressed in.
    pub output_dir: PathBuf,
    /// Hash ledger of the last verified digest per artifact.
    pub ledger_path: PathBuf,
    /// Human-readable per-artifact outcome log, rewritten every run.
    pub report_path: PathBuf,
    /// Marker written only when no artifact changed (consumed by CI).
    pub marker_path: PathBuf,
    /// Upper bound for the navigate/agree/click/wait sequence of one page.
    pub page_timeout_secs: u64,
    /// Digest algorithm the vendor publishes.
    pub checksum: ChecksumAlgorithm,
    /// How artifact identities are derived from download URLs.
    pub identity: IdentityMode,
    /// Extra download attempts for artifacts whose checksum did not match (0 = none).
    pub mismatch_retries: u32,
    /// Record page-level failures and move on instead of aborting the run.
    pub continue_on_page_error: bool,
    /// After verification, rename `dbip-city-lite-2024-06.mmdb` to
    /// `dbip-city-lite.mmdb` so consumers read a fixed path.
    pub stable_names: bool,
    pub browser: BrowserConfig,
    pub pages: Vec<PageSpec>,
}

impl Default for GeosyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            ledger_path: PathBuf::from("output/ledger.log"),
            report_path: PathBuf::from("output/downloads.log"),
            marker_path: PathBuf::from("no-updates.flag"),
            page_timeout_secs: 120,
            checksum: ChecksumAlgorithm::Sha1,
            identity: IdentityMode::Url,
            mismatch_retries: 0,
            continue_on_page_error: false,
            stable_names: false,
            browser: BrowserConfig::default(),
            pages: default_pages(),
        }
    }
}

impl GeosyncConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.page_timeout_secs == 0 {
            anyhow::bail!("page_timeout_secs must be greater than zero");
        }
        if self.pages.is_empty() {
            anyhow::bail!("no pages configured");
        }
        for page in &self.pages {
            if page.artifacts.is_empty() {
                anyhow::bail!("page {} has no artifacts", page.url);
            }
            for artifact in &page.artifacts {
                if !artifact.suffix.ends_with(".gz") {
                    anyhow::bail!(
                        "artifact {} on {}: suffix {:?} is not a .gz archive",
                        artifact.label,
                        page.url,
                        artifact.suffix
                    );
                }
            }
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("geosync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<GeosyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = GeosyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load and validate configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<GeosyncConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: GeosyncConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
