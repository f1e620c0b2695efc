//! Headless Chrome driven over the DevTools protocol.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::cdp::{CdpConnection, CdpEvent};
use super::{
    AutomationError, BrowserDriver, DownloadEvent, DownloadEvents, DownloadSession, DownloadState,
    LinkTarget,
};
use crate::config::BrowserConfig;

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long to wait for the checkbox or a link to become visible.
const ELEMENT_WAIT: Duration = Duration::from_secs(30);

/// Launches one Chrome process and hands out a fresh browser context per page.
/// Chrome is killed when the driver is dropped.
pub struct ChromeDriver {
    connection: Arc<CdpConnection>,
    settings: BrowserConfig,
    _child: Child,
    _profile: tempfile::TempDir,
}

impl ChromeDriver {
    pub async fn launch(settings: &BrowserConfig) -> Result<Self, AutomationError> {
        let chrome = settings.resolved_chrome_path();
        let profile = tempfile::Builder::new()
            .prefix("geosync-chrome-")
            .tempdir()
            .map_err(|source| launch_error(&chrome, source))?;

        let mut cmd = Command::new(&chrome);
        cmd.arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!("--user-agent={}", settings.user_agent))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if settings.headless {
            cmd.arg("--headless=new");
        }
        cmd.arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| launch_error(&chrome, source))?;
        tracing::info!(chrome = %chrome.display(), "launched browser");

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AutomationError::Handshake("stderr not captured".into()))?;
        let mut lines = BufReader::new(stderr).lines();

        let ws_url = tokio::time::timeout(settings.launch_timeout(), async {
            while let Some(line) = lines.next_line().await.ok().flatten() {
                if let Some(url) = parse_devtools_line(&line) {
                    return Ok(url);
                }
                tracing::trace!(target: "geosync_core::chrome", "{}", line);
            }
            Err(AutomationError::Handshake(
                "browser exited before printing its endpoint".into(),
            ))
        })
        .await
        .map_err(|_| {
            AutomationError::Handshake(format!(
                "no endpoint within {}s",
                settings.launch_timeout().as_secs()
            ))
        })??;

        // Keep draining stderr so Chrome never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "geosync_core::chrome", "{}", line);
            }
        });

        tracing::debug!(endpoint = %ws_url, "connecting to devtools");
        let connection = Arc::new(CdpConnection::connect(&ws_url).await?);
        Ok(Self {
            connection,
            settings: settings.clone(),
            _child: child,
            _profile: profile,
        })
    }
}

fn launch_error(chrome: &Path, source: std::io::Error) -> AutomationError {
    AutomationError::Launch {
        path: chrome.display().to_string(),
        source,
    }
}

/// Extract the browser WebSocket URL from Chrome's startup banner.
fn parse_devtools_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_PREFIX)?;
    let url = rest.trim();
    url.starts_with("ws://").then(|| url.to_string())
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open_session(
        &mut self,
        download_dir: &Path,
    ) -> Result<Box<dyn DownloadSession>, AutomationError> {
        let conn = &self.connection;
        let download_path = if download_dir.is_absolute() {
            download_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(download_dir))
                .unwrap_or_else(|_| download_dir.to_path_buf())
        };

        let context = conn
            .call("Target.createBrowserContext", json!({}), None)
            .await?;
        let context_id = string_field(&context, "Target.createBrowserContext", "browserContextId")?;

        conn.call(
            "Browser.setDownloadBehavior",
            json!({
                "behavior": "allow",
                "browserContextId": context_id,
                "downloadPath": download_path.display().to_string(),
                "eventsEnabled": true,
            }),
            None,
        )
        .await?;

        let target = conn
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": context_id }),
                None,
            )
            .await?;
        let target_id = string_field(&target, "Target.createTarget", "targetId")?;

        let attached = conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "Target.attachToTarget", "sessionId")?;
        conn.call("Page.enable", json!({}), Some(&session_id)).await?;

        tracing::debug!(context = %context_id, download_dir = %download_path.display(), "opened browser context");
        Ok(Box::new(ChromeSession {
            connection: Arc::clone(&self.connection),
            settings: self.settings.clone(),
            context_id,
            session_id,
            download_dir: download_path,
        }))
    }
}

/// Defers launching Chrome until the first page actually needs a download,
/// so a run where every artifact is unchanged never starts a browser.
pub struct LazyChromeDriver {
    settings: BrowserConfig,
    inner: Option<ChromeDriver>,
}

impl LazyChromeDriver {
    pub fn new(settings: BrowserConfig) -> Self {
        Self {
            settings,
            inner: None,
        }
    }
}

#[async_trait]
impl BrowserDriver for LazyChromeDriver {
    async fn open_session(
        &mut self,
        download_dir: &Path,
    ) -> Result<Box<dyn DownloadSession>, AutomationError> {
        let driver = match &mut self.inner {
            Some(driver) => driver,
            slot => slot.insert(ChromeDriver::launch(&self.settings).await?),
        };
        driver.open_session(download_dir).await
    }
}

fn string_field(value: &Value, method: &str, field: &'static str) -> Result<String, AutomationError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AutomationError::Response {
            method: method.to_string(),
            field,
        })
}

struct ChromeSession {
    connection: Arc<CdpConnection>,
    settings: BrowserConfig,
    context_id: String,
    session_id: String,
    download_dir: PathBuf,
}

impl ChromeSession {
    async fn evaluate(&self, expression: &str) -> Result<Value, AutomationError> {
        let reply = self
            .connection
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
                Some(&self.session_id),
            )
            .await?;
        if let Some(details) = reply.get("exceptionDetails") {
            return Err(AutomationError::Protocol {
                method: "Runtime.evaluate".into(),
                message: details
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("script threw")
                    .to_string(),
            });
        }
        Ok(reply
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Poll until `selector` matches a rendered element.
    async fn wait_visible(&self, selector: &str) -> Result<(), AutomationError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return false; const r = el.getBoundingClientRect(); \
             const s = window.getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()",
            sel = js_string(selector)
        );
        let started = Instant::now();
        loop {
            if self.evaluate(&expression).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if started.elapsed() >= ELEMENT_WAIT {
                return Err(AutomationError::ElementNotFound {
                    selector: selector.to_string(),
                    waited_secs: ELEMENT_WAIT.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn run_on(&self, selector: &str, body: &str) -> Result<(), AutomationError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; {body} return true; }})()",
            sel = js_string(selector)
        );
        match self.evaluate(&expression).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(AutomationError::ElementNotFound {
                selector: selector.to_string(),
                waited_secs: 0,
            }),
        }
    }
}

/// JSON string literal, which is also a valid JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Selector for the download link whose href ends with `suffix`.
fn link_selector(base: &str, suffix: &str) -> String {
    format!("{base}[href$={}]", js_string(suffix))
}

#[async_trait]
impl DownloadSession for ChromeSession {
    fn subscribe(&mut self) -> DownloadEvents {
        let mut raw = self.connection.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = raw.recv().await {
                if let Some(ev) = download_event(&event) {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
            }
        });
        rx
    }

    async fn trigger(&mut self, page_url: &str, links: &[LinkTarget]) -> Result<(), AutomationError> {
        self.connection
            .call("Page.navigate", json!({ "url": page_url }), Some(&self.session_id))
            .await?;

        let agree = self.settings.agree_selector.clone();
        self.wait_visible(&agree).await?;
        tracing::debug!(page = %page_url, "license agreement visible");
        self.run_on(
            &agree,
            "el.checked = true; el.dispatchEvent(new Event('change', { bubbles: true }));",
        )
        .await?;
        tracing::debug!(page = %page_url, "license agreement checked");
        tokio::time::sleep(self.settings.settle()).await;

        for (i, link) in links.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.click_gap()).await;
            }
            let selector = link_selector(&self.settings.link_selector, &link.href_suffix);
            self.wait_visible(&selector).await?;
            self.run_on(&selector, "el.click();").await?;
            tracing::info!(
                page = %page_url,
                label = %link.label,
                dir = %self.download_dir.display(),
                "clicked download link"
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        self.connection
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
            )
            .await?;
        tracing::debug!(context = %self.context_id, "closed browser context");
        Ok(())
    }
}

/// Map a `Browser.downloadProgress` event to a [`DownloadEvent`].
fn download_event(event: &CdpEvent) -> Option<DownloadEvent> {
    if event.method != "Browser.downloadProgress" {
        return None;
    }
    let p = &event.params;
    Some(DownloadEvent {
        guid: p.get("guid")?.as_str()?.to_string(),
        state: DownloadState::from_cdp(p.get("state")?.as_str()?)?,
        received_bytes: p.get("receivedBytes").and_then(Value::as_f64).unwrap_or(0.0) as u64,
        total_bytes: p.get("totalBytes").and_then(Value::as_f64).unwrap_or(0.0) as u64,
    })
}
