//! Crash-safe file writes
//!
//! Full rewrites go through a temporary sibling file that is synced and then
//! renamed over the target, so readers only ever observe the old or the new
//! contents. Single-line appends write in place.

use crate::error::{HistoryError, HistoryResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary sibling path, unique within this process
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

async fn ensure_parent(path: &Path) -> HistoryResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| HistoryError::io_at("create directory", parent, e))?;
    }
    Ok(())
}

/// Replace the contents of `path` atomically
pub async fn write_all(path: &Path, bytes: &[u8]) -> HistoryResult<()> {
    ensure_parent(path).await?;
    let tmp = temp_path_for(path);

    let written = async {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await
            .map_err(|e| HistoryError::io_at("create", &tmp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| HistoryError::io_at("write", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| HistoryError::io_at("sync", &tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| HistoryError::io_at("rename into", path, e))
    }
    .await;

    if written.is_err() {
        if let Err(e) = fs::remove_file(&tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temporary file {:?}: {}", tmp, e);
            }
        }
    } else {
        debug!("Atomically wrote {} bytes to {:?}", bytes.len(), path);
    }
    written
}

/// Append bytes to the end of `path`, creating it if needed
pub async fn append_one(path: &Path, bytes: &[u8]) -> HistoryResult<()> {
    ensure_parent(path).await?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| HistoryError::io_at("open", path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| HistoryError::io_at("append to", path, e))?;
    file.flush()
        .await
        .map_err(|e| HistoryError::io_at("flush", path, e))?;
    Ok(())
}

/// Remove a file, treating an already-missing file as success
pub async fn remove_if_exists(path: &Path) -> HistoryResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HistoryError::io_at("remove", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_all_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("chat.jsonl");

        write_all(&path, b"first\n").await.unwrap();
        write_all(&path, b"second\n").await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"second\n");
    }

    #[tokio::test]
    async fn test_write_all_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        write_all(&path, b"x\n").await.unwrap();

        let mut entries = fs::read_dir(tmp.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["chat.jsonl".to_string()]);
    }

    #[tokio::test]
    async fn test_append_one_accumulates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        append_one(&path, b"a\n").await.unwrap();
        append_one(&path, b"b\n").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"a\nb\n");
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("partial.json");
        assert!(!remove_if_exists(&path).await.unwrap());
        write_all(&path, b"{}").await.unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
    }
}
