//! Scripted vendor site for end-to-end runner tests.
//!
//! One shared [`SiteState`] backs both a [`FakeResolver`] (what the pages
//! publish) and a [`FakeDriver`] (what clicking a link lands on disk), so a
//! test can change the published content between runs and inspect which
//! links were clicked.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use geosync_core::artifact::{ArtifactDescriptor, ArtifactIdentity, IdentityMode};
use geosync_core::browser::{
    AutomationError, BrowserDriver, DownloadEvent, DownloadEvents, DownloadSession, DownloadState,
    LinkTarget,
};
use geosync_core::checksum::{digest_reader, ChecksumAlgorithm};
use geosync_core::config::{ArtifactSpec, GeosyncConfig, PageSpec};
use geosync_core::resolver::{DescriptorResolver, ResolveError};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub const HOST: &str = "https://download.example.test/free/";

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(body).unwrap();
    enc.finish().unwrap()
}

pub fn sha1_hex(body: &[u8]) -> String {
    digest_reader(body, ChecksumAlgorithm::Sha1).unwrap()
}

#[derive(Debug, Clone)]
pub struct FakeArtifact {
    pub label: String,
    pub suffix: String,
    pub file_name: String,
    /// Decompressed content the download produces.
    pub content: Vec<u8>,
    /// Hash the page publishes; defaults to the true hash of `content`.
    pub published_hash: String,
    /// Number of upcoming downloads that land corrupted content.
    pub corrupt_downloads: usize,
}

impl FakeArtifact {
    pub fn new(label: &str, suffix: &str, stem: &str, content: &[u8]) -> Self {
        Self {
            label: label.to_string(),
            suffix: suffix.to_string(),
            file_name: format!("{stem}{suffix}"),
            content: content.to_vec(),
            published_hash: sha1_hex(content),
            corrupt_downloads: 0,
        }
    }

    pub fn download_url(&self) -> String {
        format!("{HOST}{}", self.file_name)
    }

    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::from_url(&self.download_url(), IdentityMode::Url)
    }

    fn descriptor(&self) -> ArtifactDescriptor {
        ArtifactDescriptor {
            identity: self.identity(),
            download_url: self.download_url(),
            expected_hash: self.published_hash.clone(),
            label: self.label.clone(),
            link_suffix: self.suffix.clone(),
            file_name: self.file_name.clone(),
        }
    }

    fn spec(&self) -> ArtifactSpec {
        ArtifactSpec::new(&self.label, &self.suffix)
    }
}

#[derive(Debug, Default)]
pub struct SiteState {
    pub pages: BTreeMap<String, Vec<FakeArtifact>>,
    /// Pages whose clicks never produce a completion event.
    pub stalled: BTreeSet<String>,
    /// Every clicked `(page, suffix)`, in order.
    pub clicks: Vec<(String, String)>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

#[derive(Clone, Default)]
pub struct FakeSite(Arc<Mutex<SiteState>>);

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SiteState> {
        self.0.lock().unwrap()
    }

    pub fn publish(&self, page: &str, artifacts: Vec<FakeArtifact>) {
        self.state().pages.insert(page.to_string(), artifacts);
    }

    pub fn stall(&self, page: &str) {
        self.state().stalled.insert(page.to_string());
    }

    pub fn artifact_mut<R>(&self, page: &str, suffix: &str, f: impl FnOnce(&mut FakeArtifact) -> R) -> R {
        let mut state = self.state();
        let artifact = state
            .pages
            .get_mut(page)
            .and_then(|arts| arts.iter_mut().find(|a| a.suffix == suffix))
            .unwrap();
        f(artifact)
    }

    pub fn clicks(&self) -> Vec<(String, String)> {
        self.state().clicks.clone()
    }

    pub fn page_specs(&self) -> Vec<PageSpec> {
        self.state()
            .pages
            .iter()
            .map(|(url, arts)| PageSpec {
                url: url.clone(),
                artifacts: arts.iter().map(FakeArtifact::spec).collect(),
            })
            .collect()
    }

    pub fn resolver(&self) -> FakeResolver {
        FakeResolver(self.clone())
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver(self.clone())
    }
}

pub struct FakeResolver(FakeSite);

#[async_trait]
impl DescriptorResolver for FakeResolver {
    async fn resolve(&self, page: &PageSpec) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
        let state = self.0.state();
        let artifacts = state.pages.get(&page.url).ok_or_else(|| ResolveError::MissingLink {
            suffix: page
                .artifacts
                .first()
                .map(|a| a.suffix.clone())
                .unwrap_or_default(),
        })?;
        Ok(artifacts.iter().map(FakeArtifact::descriptor).collect())
    }
}

pub struct FakeDriver(FakeSite);

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_session(
        &mut self,
        download_dir: &Path,
    ) -> Result<Box<dyn DownloadSession>, AutomationError> {
        self.0.state().sessions_opened += 1;
        Ok(Box::new(FakeSession {
            site: self.0.clone(),
            dir: download_dir.to_path_buf(),
            tx: None,
        }))
    }
}

struct FakeSession {
    site: FakeSite,
    dir: PathBuf,
    tx: Option<mpsc::UnboundedSender<DownloadEvent>>,
}

#[async_trait]
impl DownloadSession for FakeSession {
    fn subscribe(&mut self) -> DownloadEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        rx
    }

    async fn trigger(&mut self, page_url: &str, links: &[LinkTarget]) -> Result<(), AutomationError> {
        let mut guard = self.site.state();
        let state = &mut *guard;
        let stalled = state.stalled.contains(page_url);
        for link in links {
            state
                .clicks
                .push((page_url.to_string(), link.href_suffix.clone()));
            if stalled {
                continue;
            }
            let artifact = state
                .pages
                .get_mut(page_url)
                .and_then(|arts| arts.iter_mut().find(|a| a.suffix == link.href_suffix))
                .ok_or_else(|| AutomationError::ElementNotFound {
                    selector: format!("a[href$=\"{}\"]", link.href_suffix),
                    waited_secs: 0,
                })?;

            let mut body = artifact.content.clone();
            if artifact.corrupt_downloads > 0 {
                artifact.corrupt_downloads -= 1;
                body.push(b'!');
            }
            std::fs::write(self.dir.join(&artifact.file_name), gzip(&body)).unwrap();

            if let Some(tx) = &self.tx {
                let _ = tx.send(DownloadEvent {
                    guid: format!("{}#{}", artifact.file_name, state.clicks.len()),
                    state: DownloadState::Completed,
                    received_bytes: body.len() as u64,
                    total_bytes: body.len() as u64,
                });
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        self.site.state().sessions_closed += 1;
        Ok(())
    }
}

/// Config rooted in `root` that tracks every page the site publishes.
pub fn config_for(root: &Path, site: &FakeSite) -> GeosyncConfig {
    let output_dir = root.join("output");
    GeosyncConfig {
        ledger_path: output_dir.join("ledger.log"),
        report_path: output_dir.join("downloads.log"),
        marker_path: root.join("no-updates.flag"),
        output_dir,
        page_timeout_secs: 2,
        pages: site.page_specs(),
        ..GeosyncConfig::default()
    }
}

/// The three lite pages with an MMDB and a CSV artifact each.
pub fn three_lite_pages(site: &FakeSite) -> Vec<String> {
    ["asn", "country", "city"]
        .iter()
        .map(|kind| {
            let page = format!("https://db-ip.example.test/db/download/ip-to-{kind}-lite");
            let stem = format!("dbip-{kind}-lite-2024-06");
            site.publish(
                &page,
                vec![
                    FakeArtifact::new("MMDB", ".mmdb.gz", &stem, format!("{kind} mmdb v1").as_bytes()),
                    FakeArtifact::new("CSV", ".csv.gz", &stem, format!("{kind} csv v1").as_bytes()),
                ],
            );
            page
        })
        .collect()
}
