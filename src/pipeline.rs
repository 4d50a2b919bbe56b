//! # Download Pipeline Module
//!
//! Turns candidate URLs into stored files plus metadata records. Candidates
//! are processed one at a time in discovery order, which keeps the cap exact
//! and the output order equal to discovery order.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{ debug, info, warn };

use crate::config::BackendKind;
use crate::error::{ ScrapeError, StoreError };
use crate::fetcher::{ FetchedImage, ImageSource };
use crate::image_store::{ candidate_filename, sanitize_keyword, ImageStore };
use crate::metadata_store::MetadataStore;
use crate::models::{ CandidateUrl, ImageRecord };

/// Upper bound on suffixes tried for one candidate before giving up.
pub const DEFAULT_MAX_NAME_ATTEMPTS: usize = 1000;

/// Which step a [`SkipReason`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The extractor itself failed; no candidates were produced.
    Backend,
    Fetch,
    Store,
    /// The image was stored and returned, but its record was not persisted.
    Metadata,
}

/// One itemized problem encountered during a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipReason {
    pub stage: Stage,
    pub url: Option<String>,
    pub rank: Option<usize>,
    pub message: String,
}

impl SkipReason {
    pub fn backend(err: &ScrapeError) -> Self {
        SkipReason { stage: Stage::Backend, url: None, rank: None, message: err.to_string() }
    }

    fn candidate(stage: Stage, candidate: &CandidateUrl, err: &ScrapeError) -> Self {
        SkipReason {
            stage,
            url: Some(candidate.url.clone()),
            rank: Some(candidate.rank),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub attempted: usize,
    pub saved: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
    pub metadata_failures: usize,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub records: Vec<ImageRecord>,
    pub skipped: Vec<SkipReason>,
    pub summary: DownloadSummary,
}

pub struct Downloader {
    images: Arc<dyn ImageSource>,
    store: Arc<dyn ImageStore>,
    metadata: Arc<dyn MetadataStore>,
    delay: Duration,
    max_name_attempts: usize,
}

impl Downloader {
    pub fn new(
        images: Arc<dyn ImageSource>,
        store: Arc<dyn ImageStore>,
        metadata: Arc<dyn MetadataStore>
    ) -> Self {
        Downloader {
            images,
            store,
            metadata,
            delay: Duration::ZERO,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }

    /// Pause between consecutive fetches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_name_attempts(mut self, attempts: usize) -> Self {
        self.max_name_attempts = attempts.max(1);
        self
    }

    /// Downloads candidates in order until `max_images` records exist or the
    /// candidates run out. Failing candidates are skipped and itemized.
    pub async fn download<I>(
        &self,
        candidates: I,
        keyword: &str,
        max_images: usize,
        backend: BackendKind
    ) -> DownloadReport
        where I: IntoIterator<Item = CandidateUrl>, I::IntoIter: Send
    {
        let safe_keyword = sanitize_keyword(keyword);
        let mut report = DownloadReport::default();

        for candidate in candidates {
            if report.records.len() >= max_images {
                break;
            }
            if report.summary.attempted > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            report.summary.attempted += 1;

            let image = match self.images.fetch_image(&candidate.url).await {
                Ok(image) => image,
                Err(source) => {
                    let err = ScrapeError::FetchFailure { url: candidate.url.clone(), source };
                    warn!(rank = candidate.rank, %err, "skipping candidate");
                    report.summary.fetch_failures += 1;
                    report.skipped.push(SkipReason::candidate(Stage::Fetch, &candidate, &err));
                    continue;
                }
            };

            let filename = match self.store_image(&safe_keyword, &candidate, &image).await {
                Ok(filename) => filename,
                Err(source) => {
                    let err = ScrapeError::StoreWriteFailure { url: candidate.url.clone(), source };
                    warn!(rank = candidate.rank, %err, "skipping candidate");
                    report.summary.store_failures += 1;
                    report.skipped.push(SkipReason::candidate(Stage::Store, &candidate, &err));
                    continue;
                }
            };

            let record = ImageRecord::new(keyword, &candidate, filename, backend);
            if let Err(source) = self.metadata.insert_record(&record).await {
                let err = ScrapeError::StoreWriteFailure { url: candidate.url.clone(), source };
                warn!(rank = candidate.rank, %err, "metadata not saved, keeping image");
                report.summary.metadata_failures += 1;
                report.skipped.push(SkipReason::candidate(Stage::Metadata, &candidate, &err));
            }
            info!(rank = candidate.rank, filename = %record.local_filename, "saved");
            report.records.push(record);
        }

        report.summary.saved = report.records.len();
        info!(
            backend = %backend,
            query = keyword,
            saved = report.summary.saved,
            attempted = report.summary.attempted,
            fetch_failures = report.summary.fetch_failures,
            store_failures = report.summary.store_failures,
            metadata_failures = report.summary.metadata_failures,
            "download finished"
        );
        report
    }

    /// Claims the first free `keyword_rank[_n].ext` name and writes to it.
    async fn store_image(
        &self,
        safe_keyword: &str,
        candidate: &CandidateUrl,
        image: &FetchedImage
    ) -> Result<String, StoreError> {
        let ext = image.extension();
        for attempt in 0..self.max_name_attempts {
            let filename = candidate_filename(safe_keyword, candidate.rank, attempt, ext);
            if self.store.exists(&filename).await {
                continue;
            }
            match self.store.write_new(&filename, &image.bytes).await {
                Ok(()) => {
                    return Ok(filename);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(%filename, "lost race for filename, trying next suffix");
                }
                Err(err) => {
                    return Err(err);
                }
            }
        }
        Err(StoreError::Exhausted(candidate_filename(safe_keyword, candidate.rank, 0, ext)))
    }
}
