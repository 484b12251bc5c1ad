use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::versioning::{LocalDocument, RemoteEntry};

/// Errors that abort a sync run. Per-file failures are logged and counted
/// in the [`SyncReport`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source error: {0}")]
    Source(String),
    #[error("Destination error: {0}")]
    Destination(String),
    #[error("Staging error: {0}")]
    Staging(String),
}

/// How a source file has to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Editor-native document, exported to PDF on fetch.
    NativeDocument,
    /// Regular uploaded file, downloaded as-is.
    Blob,
}

/// A file in a source folder, independent of any HTTP types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: String,
    pub name: String,
    pub format: SourceFormat,
    pub modified_at: Option<DateTime<Utc>>,
}

impl SourceFile {
    /// Filename the fetched bytes are staged and uploaded under.
    pub fn staged_name(&self) -> String {
        match self.format {
            SourceFormat::NativeDocument => format!("{}.pdf", self.name),
            SourceFormat::Blob => self.name.clone(),
        }
    }
}

/// Counters for one run, logged when it finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub staged: usize,
    pub fetch_failures: usize,
    pub superseded: usize,
    pub delete_failures: usize,
    pub uploaded: usize,
    pub upload_failures: usize,
}

/// Where documents come from (Google Drive in production).
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Resolves a slash-separated folder path to the source's folder id.
    async fn resolve_folder(&self, path: &str) -> Result<String, SyncError>;

    /// Lists files directly inside a folder modified after `since`.
    async fn list_recent(
        &self,
        folder_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SourceFile>, SyncError>;

    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, SyncError>;
}

/// Where documents go (Dropbox in production).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, SyncError>;

    /// Writes a file, replacing any existing file with the same name.
    async fn upload(&self, folder: &str, name: &str, contents: Vec<u8>) -> Result<(), SyncError>;

    async fn delete(&self, path: &str) -> Result<(), SyncError>;
}

/// Scratch area that holds one run's downloads.
#[async_trait]
pub trait StagingArea: Send + Sync {
    /// Creates the area, discarding anything left over from an earlier run.
    async fn prepare(&self) -> Result<(), SyncError>;

    async fn stage(&self, folder: &str, name: &str, contents: &[u8]) -> Result<PathBuf, SyncError>;

    /// Every staged file, tagged with its folder.
    async fn list(&self) -> Result<Vec<LocalDocument>, SyncError>;

    async fn read(&self, document: &LocalDocument) -> Result<Vec<u8>, SyncError>;

    async fn clear(&self) -> Result<(), SyncError>;
}
