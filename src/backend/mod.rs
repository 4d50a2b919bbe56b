//! # Backend Module
//!
//! The two URL discovery strategies and the selector that picks one. The
//! selector never fails: when the browser cannot be brought up it hands back
//! the lightweight extractor.

pub mod browser;
pub mod chrome;
pub mod lightweight;

use std::sync::atomic::{ AtomicU8, Ordering };
use std::sync::Arc;
use tracing::{ info, warn };
use url::Url;

use crate::config::{ BackendKind, ScrapeConfig };
use crate::error::ScrapeError;
use crate::extract::Candidates;
use crate::fetcher::PageSource;

pub use browser::{ BrowserExtractor, BrowserSession, ScrollState, SessionLauncher };
pub use chrome::ChromeLauncher;
pub use lightweight::LightweightExtractor;

/// Where and how the provider's image search is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub endpoint: String,
    pub lang: String,
    pub safe: String,
}

impl SearchTarget {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        SearchTarget {
            endpoint: config.search_endpoint.clone(),
            lang: config.lang.clone(),
            safe: config.safe.clone(),
        }
    }

    /// Image-search results URL for `keyword`.
    pub fn url_for(&self, keyword: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", keyword),
                ("tbm", "isch"),
                ("hl", self.lang.as_str()),
                ("safe", self.safe.as_str()),
            ]
        )
    }
}

/// A ready-to-run extractor. Consumed by [`Extractor::extract`], so a browser
/// session is used by exactly one extraction.
pub enum Extractor {
    Lightweight(LightweightExtractor),
    Browser(BrowserExtractor),
}

impl Extractor {
    pub fn kind(&self) -> BackendKind {
        match self {
            Extractor::Lightweight(_) => BackendKind::Lightweight,
            Extractor::Browser(_) => BackendKind::Browser,
        }
    }

    /// Discovers candidate URLs for `keyword`.
    ///
    /// A results page without matches is an empty sequence, not an error. The
    /// lightweight variant reports an unreachable page as
    /// [`ScrapeError::FetchFailure`]; the browser variant reports
    /// [`ScrapeError::BackendUnavailable`] and has closed its session by the
    /// time this returns.
    pub async fn extract(self, keyword: &str) -> Result<Candidates, ScrapeError> {
        match self {
            Extractor::Lightweight(extractor) => extractor.extract(keyword).await,
            Extractor::Browser(extractor) => extractor.extract(keyword).await,
        }
    }
}

/// Whether the browser backend came up in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Default)]
pub struct BackendAvailability(AtomicU8);

impl BackendAvailability {
    pub fn get(&self) -> Availability {
        match self.0.load(Ordering::Acquire) {
            1 => Availability::Available,
            2 => Availability::Unavailable,
            _ => Availability::Unknown,
        }
    }

    pub fn set(&self, availability: Availability) {
        let raw = match availability {
            Availability::Unknown => 0,
            Availability::Available => 1,
            Availability::Unavailable => 2,
        };
        self.0.store(raw, Ordering::Release);
    }
}

/// Picks the extractor for one search.
///
/// A browser launch failure or timeout is logged and answered with the
/// lightweight extractor; it is never returned to the caller.
pub async fn select_backend(
    config: &ScrapeConfig,
    preference: BackendKind,
    launcher: &dyn SessionLauncher,
    pages: Arc<dyn PageSource>,
    availability: &BackendAvailability
) -> Extractor {
    let target = SearchTarget::from_config(config);
    let lightweight = |pages: Arc<dyn PageSource>| {
        Extractor::Lightweight(LightweightExtractor::new(pages, target.clone()))
    };

    if preference == BackendKind::Lightweight {
        return lightweight(pages);
    }

    if availability.get() == Availability::Unavailable && !config.browser.retry_unavailable {
        info!("browser backend unavailable earlier in this process, using lightweight");
        return lightweight(pages);
    }

    let launched = tokio::time::timeout(
        config.browser.launch_timeout,
        launcher.launch(&config.browser)
    ).await;
    let failure = match launched {
        Ok(Ok(session)) => {
            availability.set(Availability::Available);
            return Extractor::Browser(
                BrowserExtractor::new(session, config.browser.clone(), target.clone())
            );
        }
        Ok(Err(err)) => err.to_string(),
        Err(_) => format!("launch timed out after {:?}", config.browser.launch_timeout),
    };

    warn!(reason = %failure, "browser backend failed to start, falling back to lightweight");
    availability.set(Availability::Unavailable);
    lightweight(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::browser::testing::{ FailingLauncher, FakeLauncher, HangingLauncher };
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct NoPages;

    #[async_trait]
    impl PageSource for NoPages {
        async fn fetch_page(&self, _url: &Url) -> Result<String, FetchError> {
            Err(FetchError::Status(503))
        }
    }

    fn browser_config() -> ScrapeConfig {
        ScrapeConfig::builder().backend(BackendKind::Browser).build()
    }

    #[test]
    fn test_search_target_url() {
        let target = SearchTarget::from_config(&ScrapeConfig::default());
        let url = target.url_for("red panda").unwrap();

        assert_eq!(url.host_str(), Some("www.google.com"));
        assert_eq!(url.query(), Some("q=red+panda&tbm=isch&hl=en&safe=off"));
    }

    #[tokio::test]
    async fn test_lightweight_preference_never_launches() {
        let launcher = FakeLauncher::new(vec![]);
        let availability = BackendAvailability::default();
        let extractor = select_backend(
            &browser_config(),
            BackendKind::Lightweight,
            &launcher,
            Arc::new(NoPages),
            &availability
        ).await;

        assert_eq!(extractor.kind(), BackendKind::Lightweight);
        assert_eq!(launcher.launches(), 0);
        assert_eq!(availability.get(), Availability::Unknown);
    }

    #[tokio::test]
    async fn test_browser_launch_success() {
        let launcher = FakeLauncher::new(vec![]);
        let availability = BackendAvailability::default();
        let extractor = select_backend(
            &browser_config(),
            BackendKind::Browser,
            &launcher,
            Arc::new(NoPages),
            &availability
        ).await;

        assert_eq!(extractor.kind(), BackendKind::Browser);
        assert_eq!(availability.get(), Availability::Available);
    }

    #[tokio::test]
    async fn test_launch_failure_falls_back_every_time() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let launcher = FailingLauncher::new(attempts.clone());
        let mut config = browser_config();
        config.browser.retry_unavailable = true;
        let availability = BackendAvailability::default();

        for _ in 0..3 {
            let extractor = select_backend(
                &config,
                BackendKind::Browser,
                &launcher,
                Arc::new(NoPages),
                &availability
            ).await;
            assert_eq!(extractor.kind(), BackendKind::Lightweight);
        }
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(availability.get(), Availability::Unavailable);
    }

    #[tokio::test]
    async fn test_unavailable_is_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let launcher = FailingLauncher::new(attempts.clone());
        let availability = BackendAvailability::default();

        for _ in 0..2 {
            let extractor = select_backend(
                &browser_config(),
                BackendKind::Browser,
                &launcher,
                Arc::new(NoPages),
                &availability
            ).await;
            assert_eq!(extractor.kind(), BackendKind::Lightweight);
        }
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_timeout_falls_back() {
        let mut config = browser_config();
        config.browser.launch_timeout = Duration::from_secs(2);
        let availability = BackendAvailability::default();

        let extractor = select_backend(
            &config,
            BackendKind::Browser,
            &HangingLauncher,
            Arc::new(NoPages),
            &availability
        ).await;

        assert_eq!(extractor.kind(), BackendKind::Lightweight);
        assert_eq!(availability.get(), Availability::Unavailable);
    }
}
