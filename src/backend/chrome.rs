use async_trait::async_trait;
use headless_chrome::{ Browser, LaunchOptionsBuilder, Tab };
use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{ debug, info };
use url::Url;

use super::browser::{ BrowserSession, SessionLauncher };
use crate::config::BrowserConfig;
use crate::error::ScrapeError;
use crate::user_agents;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

fn unavailable(err: impl Display) -> ScrapeError {
    ScrapeError::BackendUnavailable(err.to_string())
}

/// Launches a local headless Chrome/Chromium over the DevTools protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeLauncher {
    accept_language: String,
}

impl ChromeLauncher {
    /// Tabs announce `lang` the same way the HTTP fetcher does.
    pub fn new(lang: &str) -> Self {
        ChromeLauncher { accept_language: user_agents::accept_language(lang) }
    }

    pub fn accept_language(&self) -> &str {
        &self.accept_language
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        ChromeLauncher::new("en")
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let headless = config.headless;
        let accept_language = self.accept_language.clone();
        let window_size = config.window_size;
        // Keep the browser alive through the slowest step we are willing to wait for.
        let idle = config.navigation_timeout.max(config.scroll_pause) + Duration::from_secs(30);
        let step_timeout = config.navigation_timeout;

        let session = tokio::task::spawn_blocking(move || -> Result<ChromeSession, ScrapeError> {
            let options = LaunchOptionsBuilder::default()
                .headless(headless)
                .sandbox(false)
                .window_size(Some(window_size))
                .idle_browser_timeout(idle)
                .args(
                    vec![
                        OsStr::new("--disable-dev-shm-usage"),
                        OsStr::new("--disable-gpu"),
                        OsStr::new("--disable-blink-features=AutomationControlled")
                    ]
                )
                .build()
                .map_err(unavailable)?;

            info!(backend = "browser", headless, "launching headless chrome");
            let browser = Browser::new(options).map_err(unavailable)?;
            let tab = browser.new_tab().map_err(unavailable)?;
            tab.set_default_timeout(step_timeout);
            tab.set_user_agent(user_agents::get_useragent(), Some(accept_language.as_str()), None)
                .map_err(unavailable)?;

            Ok(ChromeSession { browser: Some(browser), tab })
        }).await.map_err(unavailable)??;

        Ok(Box::new(session))
    }
}

/// One Chrome process with a single tab. Dropping the session drops the
/// [`Browser`], which terminates the child process.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromeSession {
    /// Runs a blocking DevTools call off the async runtime.
    async fn on_tab<T, F>(&self, f: F) -> Result<T, ScrapeError>
        where F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static, T: Send + 'static
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab)).await
            .map_err(unavailable)?
            .map_err(unavailable)
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &Url, ready_selector: &str) -> Result<(), ScrapeError> {
        let url = url.to_string();
        let selector = ready_selector.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            tab.wait_for_element(&selector)?;
            Ok(())
        }).await
    }

    async fn scroll(&mut self) -> Result<(), ScrapeError> {
        self.on_tab(|tab| {
            tab.evaluate(SCROLL_TO_BOTTOM, false)?;
            Ok(())
        }).await
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        self.on_tab(|tab| tab.get_content()).await
    }

    async fn close(&mut self) {
        if self.browser.is_none() {
            return;
        }
        if let Err(err) = self.on_tab(|tab| tab.close(true)).await {
            debug!(%err, "tab close failed, dropping browser anyway");
        }
        self.browser.take();
    }
}
