//! # Configuration Module
//!
//! Scraping settings passed explicitly into the selector and the pipeline.
//! Only [`ScrapeConfig::from_env`] touches the process environment, and it is
//! meant for binaries, not for the library core.

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.google.com/search";

/// The two interchangeable URL discovery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single HTTP fetch plus pattern extraction.
    #[default]
    Lightweight,
    /// Headless browser with scroll-driven lazy loading.
    Browser,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Lightweight => "lightweight",
            BackendKind::Browser => "browser",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lightweight" | "requests" | "http" => Ok(BackendKind::Lightweight),
            "browser" | "selenium" | "chrome" => Ok(BackendKind::Browser),
            other => Err(format!("unknown scrape backend `{}`", other)),
        }
    }
}

/// Tuning for the browser-driven backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Number of scroll-and-wait cycles after the first page load.
    pub scroll_count: usize,
    /// Suspension after each scroll so lazy-loaded results can arrive.
    pub scroll_pause: Duration,
    pub navigation_timeout: Duration,
    pub launch_timeout: Duration,
    pub headless: bool,
    pub window_size: (u32, u32),
    /// CSS selector that signals the result grid has rendered.
    pub result_selector: String,
    /// Try launching again even after a launch already failed in this process.
    pub retry_unavailable: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            scroll_count: 3,
            scroll_pause: Duration::from_millis(1500),
            navigation_timeout: Duration::from_secs(15),
            launch_timeout: Duration::from_secs(30),
            headless: true,
            window_size: (1920, 1080),
            result_selector: "img.rg_i, img.Q4LuWd, img.YQ4gaf".to_string(),
            retry_unavailable: false,
        }
    }
}

/// Process-wide scraping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub backend: BackendKind,
    pub max_images: usize,
    pub request_timeout: Duration,
    pub search_endpoint: String,
    pub lang: String,
    pub safe: String,
    pub proxy: Option<String>,
    pub ssl_verify: bool,
    pub save_directory: PathBuf,
    pub metadata_path: PathBuf,
    /// Pause between consecutive image downloads.
    pub download_delay: Duration,
    pub max_image_bytes: usize,
    pub browser: BrowserConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig {
            backend: BackendKind::Lightweight,
            max_images: 20,
            request_timeout: Duration::from_secs(10),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            lang: "en".to_string(),
            safe: "off".to_string(),
            proxy: None,
            ssl_verify: true,
            save_directory: PathBuf::from("static").join("images"),
            metadata_path: PathBuf::from("scraped_images.jsonl"),
            download_delay: Duration::ZERO,
            max_image_bytes: 15 * 1024 * 1024,
            browser: BrowserConfig::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn builder() -> ScrapeConfigBuilder {
        ScrapeConfigBuilder::new()
    }

    /// Builds a configuration from environment variables, keeping defaults
    /// for anything missing or malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ScrapeConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self where F: Fn(&str) -> Option<String> {
        let mut config = ScrapeConfig::default();

        if let Some(raw) = lookup("SCRAPE_BACKEND") {
            match raw.parse() {
                Ok(backend) => {
                    config.backend = backend;
                }
                Err(err) => warn!(%err, "ignoring SCRAPE_BACKEND"),
            }
        }
        if let Some(v) = parse_var::<usize>(&lookup, &["MAX_IMAGES"]).filter(|v| *v > 0) {
            config.max_images = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, &["REQUEST_TIMEOUT"]) {
            config.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, &["BROWSER_SCROLLS", "SELENIUM_SCROLLS"]) {
            config.browser.scroll_count = v;
        }
        if
            let Some(v) = parse_var::<f64>(
                &lookup,
                &["BROWSER_SCROLL_PAUSE", "SELENIUM_SCROLL_PAUSE"]
            ).filter(|v| v.is_finite() && *v >= 0.0)
        {
            config.browser.scroll_pause = Duration::from_secs_f64(v);
        }
        if let Some(dir) = lookup("SAVE_DIRECTORY") {
            config.save_directory = PathBuf::from(dir);
        }
        if let Some(path) = lookup("METADATA_PATH") {
            config.metadata_path = PathBuf::from(path);
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<T> {
    for key in keys {
        if let Some(raw) = lookup(key) {
            match raw.trim().parse::<T>() {
                Ok(v) => {
                    return Some(v);
                }
                Err(_) => warn!(key = *key, value = %raw, "ignoring malformed setting"),
            }
        }
    }
    None
}

/// Fluent builder over [`ScrapeConfig`].
#[derive(Debug, Clone, Default)]
pub struct ScrapeConfigBuilder {
    config: ScrapeConfig,
}

impl ScrapeConfigBuilder {
    pub fn new() -> Self {
        ScrapeConfigBuilder { config: ScrapeConfig::default() }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn max_images(mut self, max_images: usize) -> Self {
        self.config.max_images = max_images;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.search_endpoint = endpoint.into();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.config.lang = lang.into();
        self
    }

    pub fn safe(mut self, safe: impl Into<String>) -> Self {
        self.config.safe = safe.into();
        self
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.config.proxy = proxy;
        self
    }

    pub fn ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.config.ssl_verify = ssl_verify;
        self
    }

    pub fn save_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.save_directory = dir.into();
        self
    }

    pub fn metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.metadata_path = path.into();
        self
    }

    pub fn download_delay(mut self, delay: Duration) -> Self {
        self.config.download_delay = delay;
        self
    }

    pub fn max_image_bytes(mut self, limit: usize) -> Self {
        self.config.max_image_bytes = limit;
        self
    }

    pub fn scroll_count(mut self, count: usize) -> Self {
        self.config.browser.scroll_count = count;
        self
    }

    pub fn scroll_pause(mut self, pause: Duration) -> Self {
        self.config.browser.scroll_pause = pause;
        self
    }

    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.config.browser = browser;
        self
    }

    pub fn build(self) -> ScrapeConfig {
        self.config
    }
}
