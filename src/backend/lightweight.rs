use std::sync::Arc;
use tracing::{ info, warn };

use super::SearchTarget;
use crate::error::ScrapeError;
use crate::extract::Candidates;
use crate::fetcher::PageSource;

/// One HTTP fetch of the results page, then pattern extraction.
pub struct LightweightExtractor {
    pages: Arc<dyn PageSource>,
    target: SearchTarget,
}

impl LightweightExtractor {
    pub fn new(pages: Arc<dyn PageSource>, target: SearchTarget) -> Self {
        LightweightExtractor { pages, target }
    }

    /// A page that loads but holds no matches is an empty sequence. A page
    /// that cannot be fetched is [`ScrapeError::FetchFailure`].
    pub async fn extract(&self, keyword: &str) -> Result<Candidates, ScrapeError> {
        let url = self.target.url_for(keyword).map_err(|err| {
            warn!(%err, endpoint = %self.target.endpoint, "cannot build search url");
            ScrapeError::FetchFailure { url: self.target.endpoint.clone(), source: err.into() }
        })?;

        info!(backend = "lightweight", %url, "fetching results page");
        match self.pages.fetch_page(&url).await {
            Ok(body) => {
                info!(backend = "lightweight", bytes = body.len(), "results page received");
                Ok(Candidates::scan(body))
            }
            Err(err) => {
                warn!(backend = "lightweight", query = keyword, %err, "results page fetch failed");
                Err(ScrapeError::FetchFailure { url: url.to_string(), source: err })
            }
        }
    }
}
