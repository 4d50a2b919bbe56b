use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use uuid::Uuid;

use crate::config::BackendKind;
use crate::error::ScrapeError;

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    keyword: String,
    max_images: usize,
    backend: BackendKind,
}

impl SearchQuery {
    /// Trims the keyword and rejects empty keywords or a zero cap.
    pub fn new(keyword: &str, max_images: usize, backend: BackendKind) -> Result<Self, ScrapeError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ScrapeError::InvalidQuery("keyword must not be empty".to_string()));
        }
        if max_images == 0 {
            return Err(ScrapeError::InvalidQuery("max_images must be positive".to_string()));
        }
        Ok(SearchQuery {
            keyword: keyword.to_string(),
            max_images,
            backend,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }
}

/// An image URL found by an extractor, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateUrl {
    pub url: String,
    /// Discovery order, starting at zero.
    pub rank: usize,
}

/// Metadata for one downloaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub query: String,
    pub source_url: String,
    pub local_filename: String,
    /// Path relative to the static root, e.g. `images/red_panda_0.jpg`.
    pub static_path: String,
    pub rank: usize,
    pub backend: BackendKind,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(query: &str, candidate: &CandidateUrl, filename: String, backend: BackendKind) -> Self {
        ImageRecord {
            id: Uuid::new_v4(),
            query: query.to_string(),
            source_url: candidate.url.clone(),
            static_path: format!("images/{}", filename),
            local_filename: filename,
            rank: candidate.rank,
            backend,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_trimmed() {
        let query = SearchQuery::new("  red panda \n", 3, BackendKind::Lightweight).unwrap();
        assert_eq!(query.keyword(), "red panda");
        assert_eq!(query.max_images(), 3);
    }

    #[test]
    fn test_query_rejects_blank_and_zero() {
        assert!(matches!(
            SearchQuery::new("   ", 3, BackendKind::Lightweight),
            Err(ScrapeError::InvalidQuery(_))
        ));
        assert!(matches!(
            SearchQuery::new("otter", 0, BackendKind::Browser),
            Err(ScrapeError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_record_serializes_backend_snake_case() {
        let candidate = CandidateUrl { url: "https://example.com/a.png".to_string(), rank: 4 };
        let record = ImageRecord::new("otter", &candidate, "otter_4.png".to_string(), BackendKind::Browser);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["backend"], "browser");
        assert_eq!(json["static_path"], "images/otter_4.png");
        assert_eq!(json["rank"], 4);
    }
}
