use serde::Serialize;
use std::sync::Arc;
use tracing::{ info, warn };

use crate::backend::{ select_backend, BackendAvailability, ChromeLauncher, SessionLauncher };
use crate::config::{ BackendKind, ScrapeConfig };
use crate::error::{ FetchError, ScrapeError };
use crate::extract::Candidates;
use crate::fetcher::{ Fetcher, ImageSource, PageSource };
use crate::image_store::{ FsImageStore, ImageStore };
use crate::metadata_store::{ JsonlMetadataStore, MetadataStore };
use crate::models::{ ImageRecord, SearchQuery };
use crate::pipeline::{ DownloadSummary, Downloader, SkipReason };

/// Result of one search.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub records: Vec<ImageRecord>,
    /// The backend that actually ran, after any fallback.
    pub backend_used: BackendKind,
    pub errors: Vec<SkipReason>,
    pub summary: DownloadSummary,
}

/// Runs searches end to end: backend selection, extraction, download.
pub struct Scraper {
    config: ScrapeConfig,
    pages: Arc<dyn PageSource>,
    launcher: Arc<dyn SessionLauncher>,
    downloader: Downloader,
    availability: BackendAvailability,
}

impl Scraper {
    /// A scraper with the default collaborators: a shared HTTP [`Fetcher`],
    /// headless Chrome, the configured save directory and a JSONL metadata file.
    pub fn new(config: ScrapeConfig) -> Result<Self, FetchError> {
        ScraperBuilder::new(config).build()
    }

    pub fn builder(config: ScrapeConfig) -> ScraperBuilder {
        ScraperBuilder::new(config)
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn availability(&self) -> &BackendAvailability {
        &self.availability
    }

    /// Search with the configured backend and cap.
    pub async fn search(&self, keyword: &str) -> Result<SearchOutcome, ScrapeError> {
        self.run_search(keyword, self.config.backend, self.config.max_images).await
    }

    /// Validates the request, then searches. Only an invalid query is an
    /// error; every other failure shows up in [`SearchOutcome::errors`].
    pub async fn run_search(
        &self,
        keyword: &str,
        backend: BackendKind,
        max_images: usize
    ) -> Result<SearchOutcome, ScrapeError> {
        let query = SearchQuery::new(keyword, max_images, backend)?;
        Ok(self.run_query(&query).await)
    }

    pub async fn run_query(&self, query: &SearchQuery) -> SearchOutcome {
        info!(
            query = query.keyword(),
            backend = %query.backend(),
            max = query.max_images(),
            "search started"
        );

        let extractor = select_backend(
            &self.config,
            query.backend(),
            self.launcher.as_ref(),
            self.pages.clone(),
            &self.availability
        ).await;
        let backend_used = extractor.kind();

        let mut errors = Vec::new();
        let candidates = match extractor.extract(query.keyword()).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(backend = %backend_used, %err, "extraction failed, treating as zero results");
                errors.push(SkipReason::backend(&err));
                Candidates::empty()
            }
        };

        let report = self.downloader.download(
            candidates,
            query.keyword(),
            query.max_images(),
            backend_used
        ).await;
        errors.extend(report.skipped);

        info!(
            query = query.keyword(),
            backend = %backend_used,
            saved = report.records.len(),
            errors = errors.len(),
            "search finished"
        );
        SearchOutcome {
            records: report.records,
            backend_used,
            errors,
            summary: report.summary,
        }
    }
}

/// Assembles a [`Scraper`], filling unset collaborators with defaults.
pub struct ScraperBuilder {
    config: ScrapeConfig,
    pages: Option<Arc<dyn PageSource>>,
    images: Option<Arc<dyn ImageSource>>,
    launcher: Option<Arc<dyn SessionLauncher>>,
    image_store: Option<Arc<dyn ImageStore>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl ScraperBuilder {
    pub fn new(config: ScrapeConfig) -> Self {
        ScraperBuilder {
            config,
            pages: None,
            images: None,
            launcher: None,
            image_store: None,
            metadata_store: None,
        }
    }

    pub fn page_source(mut self, pages: Arc<dyn PageSource>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn image_source(mut self, images: Arc<dyn ImageSource>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn SessionLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.image_store = Some(store);
        self
    }

    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    pub fn build(self) -> Result<Scraper, FetchError> {
        let ScraperBuilder { config, pages, images, launcher, image_store, metadata_store } = self;

        let (pages, images) = match (pages, images) {
            (Some(pages), Some(images)) => (pages, images),
            (pages, images) => {
                let fetcher = Arc::new(Fetcher::from_config(&config)?);
                (
                    pages.unwrap_or_else(|| fetcher.clone() as Arc<dyn PageSource>),
                    images.unwrap_or_else(|| fetcher.clone() as Arc<dyn ImageSource>),
                )
            }
        };
        let launcher = launcher.unwrap_or_else(|| {
            Arc::new(ChromeLauncher::new(&config.lang)) as Arc<dyn SessionLauncher>
        });
        let image_store = image_store.unwrap_or_else(|| {
            Arc::new(FsImageStore::new(config.save_directory.clone())) as Arc<dyn ImageStore>
        });
        let metadata_store = metadata_store.unwrap_or_else(|| {
            Arc::new(JsonlMetadataStore::new(config.metadata_path.clone())) as Arc<dyn MetadataStore>
        });

        let downloader = Downloader::new(images, image_store, metadata_store)
            .with_delay(config.download_delay);

        Ok(Scraper {
            config,
            pages,
            launcher,
            downloader,
            availability: BackendAvailability::default(),
        })
    }
}
