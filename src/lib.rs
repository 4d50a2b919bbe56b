//! Keyword image search with two interchangeable discovery backends, automatic
//! fallback from the browser backend to the lightweight one, and a download
//! pipeline that writes collision-free files plus metadata records.
//!
//! ```no_run
//! use googimg::{ BackendKind, ScrapeConfig, Scraper };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let scraper = Scraper::new(ScrapeConfig::default())?;
//! let outcome = scraper.run_search("red panda", BackendKind::Browser, 5).await?;
//! for record in &outcome.records {
//!     println!("{} -> {}", record.source_url, record.local_filename);
//! }
//! # Ok(())
//! # }
//! ```

mod blocklist;
mod user_agents;

pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod image_store;
pub mod metadata_store;
pub mod models;
pub mod pipeline;
mod search;

pub use backend::{ select_backend, Extractor };
pub use config::{ BackendKind, BrowserConfig, ScrapeConfig, ScrapeConfigBuilder };
pub use error::{ FetchError, ScrapeError, StoreError };
pub use models::{ CandidateUrl, ImageRecord, SearchQuery };
pub use pipeline::{ DownloadSummary, Downloader, SkipReason, Stage };
pub use search::{ Scraper, ScraperBuilder, SearchOutcome };

/// One-shot search with default collaborators built from `config`.
pub async fn search_images(
    term: &str,
    config: ScrapeConfig
) -> Result<SearchOutcome, Box<dyn std::error::Error + Send + Sync>> {
    let scraper = Scraper::new(config)?;
    let backend = scraper.config().backend;
    let max_images = scraper.config().max_images;
    Ok(scraper.run_search(term, backend, max_images).await?)
}
