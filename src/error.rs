//! # Error Module
//!
//! Error types shared by the extractors, the download pipeline and the stores.

use thiserror::Error;

/// Top-level error taxonomy of a search.
///
/// Only [`ScrapeError::InvalidQuery`] ever fails a search outright. The other
/// variants are recorded per candidate or per backend and degrade the search
/// to fewer results.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("browser backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to fetch {url}: {source}")]
    FetchFailure {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to store image from {url}: {source}")]
    StoreWriteFailure {
        url: String,
        #[source]
        source: StoreError,
    },
}

/// Why a single HTTP fetch did not produce usable bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("unexpected content type `{0}`")]
    ContentType(String),

    #[error("body is not a recognised image format")]
    NotAnImage,

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Image store and metadata store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file `{0}` already exists")]
    AlreadyExists(String),

    #[error("invalid filename `{0}`")]
    InvalidFilename(String),

    #[error("no free filename for `{0}`")]
    Exhausted(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
