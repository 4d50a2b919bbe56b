//! # Image Store Module
//!
//! A flat content directory addressed by plain filenames. Writes never
//! replace an existing file: a name is claimed by hard-linking a fully
//! written temp file, which fails atomically when another writer got there
//! first.

use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{ debug, warn };
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Writes `bytes` under `filename`, failing with
    /// [`StoreError::AlreadyExists`] rather than overwriting.
    async fn write_new(&self, filename: &str, bytes: &[u8]) -> Result<(), StoreError>;

    async fn exists(&self, filename: &str) -> bool;
}

/// Rejects anything that is not a single plain path component.
pub fn validate_filename(filename: &str) -> Result<(), StoreError> {
    let invalid = filename.is_empty() ||
        filename == "." ||
        filename.contains("..") ||
        filename.contains('/') ||
        filename.contains('\\') ||
        filename.contains('\0') ||
        filename.contains(':');
    if invalid {
        return Err(StoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Collapses runs of non-word characters to `_`, e.g. `red panda!` becomes
/// `red_panda`. Keywords with no word characters map to `image`.
pub fn sanitize_keyword(keyword: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\W+").unwrap());
    let safe = re.replace_all(keyword.trim(), "_");
    let safe = safe.trim_matches('_');
    if safe.is_empty() {
        "image".to_string()
    } else {
        safe.chars().take(80).collect()
    }
}

/// Filename for the `attempt`-th try at storing the image found at `rank`.
/// Attempt zero is the bare name; later attempts get a numeric suffix.
pub fn candidate_filename(safe_keyword: &str, rank: usize, attempt: usize, ext: &str) -> String {
    if attempt == 0 {
        format!("{}_{}.{}", safe_keyword, rank, ext)
    } else {
        format!("{}_{}_{}.{}", safe_keyword, rank, attempt, ext)
    }
}

/// [`ImageStore`] over a local directory.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsImageStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    async fn write_exclusive(&self, final_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = fs::OpenOptions::new().write(true).create_new(true).open(final_path).await?;
        if let Err(err) = file.write_all(bytes).await {
            drop(file);
            let _ = fs::remove_file(final_path).await;
            return Err(err.into());
        }
        file.flush().await?;
        Ok(())
    }
}

/// Writes the staging file, removing whatever was left at `temp_path` if the
/// write fails part way.
async fn write_temp(temp_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Err(err) = fs::write(temp_path, bytes).await {
        let _ = fs::remove_file(temp_path).await;
        return Err(err.into());
    }
    Ok(())
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn write_new(&self, filename: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let final_path = self.path_for(filename)?;
        fs::create_dir_all(&self.root).await?;

        let temp_path = self.root.join(format!(".{}.{}.part", filename, Uuid::new_v4().simple()));
        write_temp(&temp_path, bytes).await?;

        let linked = fs::hard_link(&temp_path, &final_path).await;
        let _ = fs::remove_file(&temp_path).await;

        match linked {
            Ok(()) => {
                debug!(filename, bytes = bytes.len(), "image written");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(filename.to_string()))
            }
            Err(e) => {
                // Filesystems without hard links still get create-if-absent.
                warn!(error = %e, "hard link unavailable, writing in place");
                match self.write_exclusive(&final_path, bytes).await {
                    Err(StoreError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                        Err(StoreError::AlreadyExists(filename.to_string()))
                    }
                    other => other,
                }
            }
        }
    }

    async fn exists(&self, filename: &str) -> bool {
        match self.path_for(filename) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("red_panda_0.jpg").is_ok());
        for bad in ["", ".", "../etc/passwd", "a/b.jpg", "a\\b.jpg", "x..jpg", "c:evil.png"] {
            assert!(
                matches!(validate_filename(bad), Err(StoreError::InvalidFilename(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_temp_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let temp_path = dir.path().join(".otter_0.jpg.abc.part");
        // Dangling link: the entry exists but the write through it fails.
        std::os::unix::fs::symlink(dir.path().join("missing/target"), &temp_path).unwrap();

        let result = write_temp(&temp_path, b"partial").await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sanitize_keyword() {
        assert_eq!(sanitize_keyword("red panda"), "red_panda");
        assert_eq!(sanitize_keyword("  ../../etc  "), "etc");
        assert_eq!(sanitize_keyword("!!!"), "image");
        assert_eq!(sanitize_keyword("żółw morski"), "żółw_morski");
    }

    #[test]
    fn test_candidate_filename() {
        assert_eq!(candidate_filename("otter", 3, 0, "jpg"), "otter_3.jpg");
        assert_eq!(candidate_filename("otter", 3, 2, "jpg"), "otter_3_2.jpg");
    }

    #[tokio::test]
    async fn test_write_new_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path().join("images"));

        store.write_new("a.jpg", b"first").await.unwrap();
        let second = store.write_new("a.jpg", b"second").await;

        assert!(matches!(second, Err(StoreError::AlreadyExists(name)) if name == "a.jpg"));
        assert_eq!(std::fs::read(dir.path().join("images/a.jpg")).unwrap(), b"first");
        assert!(store.exists("a.jpg").await);
        assert!(!store.exists("b.jpg").await);
    }

    #[tokio::test]
    async fn test_write_new_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        store.write_new("a.png", b"x").await.unwrap();
        let _ = store.write_new("a.png", b"y").await;

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let result = store.write_new("../escape.jpg", b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidFilename(_))));
        assert!(!store.exists("../escape.jpg").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsImageStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.write_new("same.jpg", &[i]).await }));
        }
        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => {
                    wins += 1;
                }
                Err(StoreError::AlreadyExists(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(wins, 1);
    }
}
