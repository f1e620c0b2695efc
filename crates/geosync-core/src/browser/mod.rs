//! Browser automation seam.
//!
//! The sync pipeline only needs two things from a browser: a stream of
//! download events it can subscribe to before anything is clicked, and an
//! action that runs the navigate/agree/click sequence for one page. Each page
//! gets its own [`DownloadSession`] (one browser context) which is closed
//! before the next page starts.

mod cdp;
mod chrome;

pub use chrome::{ChromeDriver, LazyChromeDriver};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Browser-reported state of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Completed,
    Canceled,
}

impl DownloadState {
    /// Parse the `state` field of a DevTools `Browser.downloadProgress` event.
    pub fn from_cdp(s: &str) -> Option<Self> {
        match s {
            "inProgress" => Some(DownloadState::InProgress),
            "completed" => Some(DownloadState::Completed),
            "canceled" => Some(DownloadState::Canceled),
            _ => None,
        }
    }
}

/// Progress or completion of one browser download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadEvent {
    /// Browser-assigned download id; distinct per triggered download.
    pub guid: String,
    pub state: DownloadState,
    pub received_bytes: u64,
    pub total_bytes: u64,
}

impl DownloadEvent {
    /// Fraction received in [0, 1]; None when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            None
        } else {
            Some((self.received_bytes as f64 / self.total_bytes as f64).min(1.0))
        }
    }
}

/// Receiving end of a session's download events.
pub type DownloadEvents = mpsc::UnboundedReceiver<DownloadEvent>;

/// One link to click: the shared link selector narrowed by the href suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub label: String,
    pub href_suffix: String,
}

/// Browser sequence failed before the downloads could be triggered.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("launch browser {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("browser did not report a DevTools endpoint: {0}")]
    Handshake(String),
    #[error("devtools socket: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("{method} failed: {message}")]
    Protocol { method: String, message: String },
    #[error("unexpected {method} response: missing {field}")]
    Response { method: String, field: &'static str },
    #[error("element {selector} not visible after {waited_secs}s")]
    ElementNotFound { selector: String, waited_secs: u64 },
    #[error("devtools connection closed")]
    Closed,
    #[error("browser did not finish {stage} within {waited_secs}s")]
    Timeout { stage: &'static str, waited_secs: u64 },
}

/// Opens one isolated download session per page.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn open_session(
        &mut self,
        download_dir: &Path,
    ) -> Result<Box<dyn DownloadSession>, AutomationError>;
}

/// Download context for a single page.
#[async_trait]
pub trait DownloadSession: Send {
    /// Start receiving download events. Events that happen before this call
    /// are not delivered, so subscribe before [`DownloadSession::trigger`].
    fn subscribe(&mut self) -> DownloadEvents;

    /// Navigate to `page_url`, accept the license, and click each link in order.
    async fn trigger(&mut self, page_url: &str, links: &[LinkTarget]) -> Result<(), AutomationError>;

    /// Tear down the browser context. Called once, on success and failure alike.
    async fn close(&mut self) -> Result<(), AutomationError>;
}
