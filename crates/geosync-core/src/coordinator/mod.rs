//! Drive one page's browser downloads to completion under a single deadline.
//!
//! The coordinator owns the completion barrier for exactly one batch. It
//! subscribes to the session's download events before anything is clicked,
//! runs the trigger sequence, then waits until every triggered download has
//! completed or the page deadline passes. The session is closed on every path
//! so the next page starts with a fresh browser context.

mod barrier;

pub use barrier::CompletionBarrier;

use std::path::Path;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

use crate::browser::{AutomationError, BrowserDriver, DownloadSession, DownloadState, LinkTarget};
use crate::error::PageError;

/// Upper bound for tearing down a session after the batch is decided.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// One batch of downloads for a single page.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub page_url: &'a str,
    pub download_dir: &'a Path,
    /// One link per expected download.
    pub links: &'a [LinkTarget],
}

/// What a finished batch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadBatch {
    pub completed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadCoordinator {
    timeout: Duration,
}

impl DownloadCoordinator {
    /// `timeout` bounds the whole open/navigate/agree/click/wait sequence.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Trigger `request.links` and wait for as many distinct completions.
    ///
    /// Returns [`PageError::Automation`] when the browser sequence itself
    /// fails or does not finish before the deadline, and
    /// [`PageError::DownloadTimeout`] when it succeeded but the completions
    /// did not all arrive in time.
    pub async fn run(
        &self,
        driver: &mut dyn BrowserDriver,
        request: DownloadRequest<'_>,
    ) -> Result<DownloadBatch, PageError> {
        let expected = request.links.len();
        let started = Instant::now();
        if expected == 0 {
            return Ok(DownloadBatch {
                completed: 0,
                elapsed: Duration::ZERO,
            });
        }
        let deadline = started + self.timeout;

        let mut session = match timeout_at(deadline, driver.open_session(request.download_dir)).await
        {
            Ok(Ok(session)) => session,
            Ok(Err(source)) => {
                return Err(PageError::Automation {
                    page: request.page_url.to_string(),
                    source,
                })
            }
            Err(_) => return Err(self.stalled(request.page_url, "opening a session")),
        };

        let result = self.drive(session.as_mut(), &request, deadline).await;

        match timeout(CLOSE_TIMEOUT, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(page = request.page_url, "closing browser session: {}", e),
            Err(_) => tracing::warn!(page = request.page_url, "closing browser session timed out"),
        }

        result.map(|completed| {
            let elapsed = started.elapsed();
            tracing::info!(
                page = request.page_url,
                completed,
                elapsed_ms = elapsed.as_millis() as u64,
                "downloads complete"
            );
            DownloadBatch { completed, elapsed }
        })
    }

    async fn drive(
        &self,
        session: &mut dyn DownloadSession,
        request: &DownloadRequest<'_>,
        deadline: Instant,
    ) -> Result<usize, PageError> {
        let page = request.page_url;
        let mut barrier = CompletionBarrier::new(request.links.len());

        // Subscribe first: a fast download may finish while the clicks run.
        let mut events = session.subscribe();

        match timeout_at(deadline, session.trigger(page, request.links)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(PageError::Automation {
                    page: page.to_string(),
                    source,
                })
            }
            Err(_) => return Err(self.stalled(page, "the download trigger")),
        }
        tracing::debug!(page, expected = barrier.expected(), "downloads triggered");

        loop {
            match timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => {
                    match event.state {
                        DownloadState::Canceled => {
                            tracing::warn!(page, guid = %event.guid, "browser canceled a download")
                        }
                        DownloadState::InProgress => {
                            if let Some(fraction) = event.fraction() {
                                tracing::debug!(
                                    page,
                                    guid = %event.guid,
                                    "download {:.0}% ({} / {} bytes)",
                                    fraction * 100.0,
                                    event.received_bytes,
                                    event.total_bytes
                                );
                            }
                        }
                        DownloadState::Completed => {
                            tracing::debug!(page, guid = %event.guid, bytes = event.received_bytes, "download completed")
                        }
                    }
                    if barrier.observe(&event) {
                        return Ok(barrier.completed());
                    }
                }
                Ok(None) => {
                    return Err(PageError::Automation {
                        page: page.to_string(),
                        source: AutomationError::Closed,
                    })
                }
                Err(_) => return Err(self.timed_out(page, barrier.completed(), barrier.expected())),
            }
        }
    }

    fn stalled(&self, page: &str, stage: &'static str) -> PageError {
        PageError::Automation {
            page: page.to_string(),
            source: AutomationError::Timeout {
                stage,
                waited_secs: self.timeout.as_secs(),
            },
        }
    }

    fn timed_out(&self, page: &str, observed: usize, expected: usize) -> PageError {
        PageError::DownloadTimeout {
            page: page.to_string(),
            observed,
            expected,
            waited: self.timeout,
        }
    }
}
