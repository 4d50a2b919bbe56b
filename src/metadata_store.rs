//! # Metadata Store Module
//!
//! Lightweight per-image metadata. Image bytes stay in the image store; only
//! records are kept here.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::StoreError;
use crate::models::ImageRecord;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_record(&self, record: &ImageRecord) -> Result<(), StoreError>;

    /// All stored records, optionally only those for `query`.
    async fn list(&self, query: Option<&str>) -> Result<Vec<ImageRecord>, StoreError>;
}

/// Append-only JSON Lines file, one record per line.
#[derive(Debug)]
pub struct JsonlMetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlMetadataStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl MetadataStore for JsonlMetadataStore {
    async fn insert_record(&self, record: &ImageRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ImageRecord>(line) {
                Ok(record) if query.map_or(true, |q| record.query == q) => records.push(record),
                Ok(_) => {}
                Err(err) => warn!(line = lineno + 1, %err, "skipping malformed metadata line"),
            }
        }
        Ok(records)
    }
}

/// Process-local store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: Mutex<Vec<ImageRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_record(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(
            records
                .iter()
                .filter(|r| query.map_or(true, |q| r.query == q))
                .cloned()
                .collect()
        )
    }
}
