//! # Browser Backend
//!
//! Scroll-driven extraction against a live browser session. The session is
//! reached only through [`BrowserSession`], so this module knows nothing about
//! the automation protocol underneath.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{ debug, info };
use url::Url;

use super::SearchTarget;
use crate::blocklist::is_external_image;
use crate::config::BrowserConfig;
use crate::error::ScrapeError;
use crate::extract::{ imgres_links, Candidates };

/// A live browser page owned by one extraction.
///
/// Implementations must release the underlying browser when dropped, so a
/// cancelled search does not leak a process even if [`BrowserSession::close`]
/// never ran.
#[async_trait]
pub trait BrowserSession: Send {
    /// Loads `url` and waits until `ready_selector` matches.
    async fn navigate(&mut self, url: &Url, ready_selector: &str) -> Result<(), ScrapeError>;

    /// Scrolls the viewport to the bottom of the document.
    async fn scroll(&mut self) -> Result<(), ScrapeError>;

    /// Current rendered HTML.
    async fn content(&mut self) -> Result<String, ScrapeError>;

    async fn close(&mut self);
}

/// Starts browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

/// Progress of one browser extraction.
#[derive(Debug)]
pub enum ScrollState {
    Navigated,
    Scrolling {
        remaining: usize,
    },
    Extracted(Candidates),
}

pub struct BrowserExtractor {
    session: Box<dyn BrowserSession>,
    config: BrowserConfig,
    target: SearchTarget,
}

impl BrowserExtractor {
    pub fn new(session: Box<dyn BrowserSession>, config: BrowserConfig, target: SearchTarget) -> Self {
        BrowserExtractor { session, config, target }
    }

    /// Navigates, scrolls `scroll_count` times and extracts. The session is
    /// closed before returning, on success and on failure.
    pub async fn extract(mut self, keyword: &str) -> Result<Candidates, ScrapeError> {
        let outcome = self.run(keyword).await;
        self.session.close().await;
        info!(backend = "browser", ok = outcome.is_ok(), "browser session closed");
        outcome
    }

    async fn run(&mut self, keyword: &str) -> Result<Candidates, ScrapeError> {
        let url = self.target
            .url_for(keyword)
            .map_err(|e| ScrapeError::BackendUnavailable(format!("bad search url: {}", e)))?;

        let mut state = self.navigate(&url).await?;
        loop {
            state = match self.advance(state).await? {
                ScrollState::Extracted(candidates) => {
                    return Ok(candidates);
                }
                next => next,
            };
        }
    }

    pub async fn navigate(&mut self, url: &Url) -> Result<ScrollState, ScrapeError> {
        info!(backend = "browser", %url, "navigating");
        let limit = self.config.navigation_timeout;
        bounded(limit, "navigation", self.session.navigate(url, &self.config.result_selector)).await?;
        info!(backend = "browser", scrolls = self.config.scroll_count, "page loaded");
        Ok(ScrollState::Navigated)
    }

    /// Performs one transition. A scroll step suspends for `scroll_pause`
    /// after scrolling; the final step reads the rendered page.
    pub async fn advance(&mut self, state: ScrollState) -> Result<ScrollState, ScrapeError> {
        let limit = self.config.navigation_timeout;
        match state {
            ScrollState::Navigated => {
                Ok(ScrollState::Scrolling { remaining: self.config.scroll_count })
            }
            ScrollState::Scrolling { remaining: 0 } => {
                let html = bounded(limit, "page content", self.session.content()).await?;
                info!(backend = "browser", chars = html.len(), "page source captured");
                Ok(ScrollState::Extracted(candidates_from_rendered(html)))
            }
            ScrollState::Scrolling { remaining } => {
                bounded(limit, "scroll", self.session.scroll()).await?;
                tokio::time::sleep(self.config.scroll_pause).await;
                debug!(backend = "browser", remaining = remaining - 1, "scroll complete");
                Ok(ScrollState::Scrolling { remaining: remaining - 1 })
            }
            extracted @ ScrollState::Extracted(_) => Ok(extracted),
        }
    }
}

/// Result links first; the raw pattern scan covers layouts without them.
fn candidates_from_rendered(html: String) -> Candidates {
    let mut links = imgres_links(&html);
    links.retain(|link| is_external_image(link));
    if links.is_empty() {
        Candidates::scan(html)
    } else {
        debug!(links = links.len(), "using result links from rendered DOM");
        Candidates::from_urls(links)
    }
}

async fn bounded<T>(
    limit: Duration,
    step: &str,
    fut: impl Future<Output = Result<T, ScrapeError>>
) -> Result<T, ScrapeError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::BackendUnavailable(format!("{} timed out after {:?}", step, limit))),
    }
}
