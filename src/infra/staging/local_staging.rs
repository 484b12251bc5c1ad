use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use walkdir::WalkDir;

use crate::core::sync::{StagingArea, SyncError};
use crate::core::versioning::LocalDocument;

/// Staging directory on local disk. Files live at `<root>/<folder>/<name>`.
pub struct LocalStagingArea {
    root: PathBuf,
}

impl LocalStagingArea {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn io_error(action: &str, path: &Path, e: std::io::Error) -> SyncError {
        SyncError::Staging(format!("Failed to {} {}: {}", action, path.display(), e))
    }

    /// Folder paths come from config and names from the source, so both are
    /// checked before they become filesystem paths.
    fn target_path(&self, folder: &str, name: &str) -> Result<PathBuf, SyncError> {
        let folder_is_safe = Path::new(folder)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        let name_is_safe = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\');

        if !folder_is_safe || !name_is_safe {
            return Err(SyncError::Staging(format!(
                "Refusing to stage '{}' in '{}'",
                name, folder
            )));
        }

        Ok(self.root.join(folder).join(name))
    }

    /// Every file under the root, tagged with its `/`-separated folder.
    fn walk(root: &Path) -> Result<Vec<LocalDocument>, SyncError> {
        let mut documents = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| SyncError::Staging(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path().to_path_buf();
            let relative = path
                .strip_prefix(root)
                .map_err(|e| SyncError::Staging(e.to_string()))?;
            let folder = relative
                .parent()
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();

            documents.push(LocalDocument {
                name: entry.file_name().to_string_lossy().into_owned(),
                folder,
                path,
            });
        }

        Ok(documents)
    }
}

#[async_trait]
impl StagingArea for LocalStagingArea {
    async fn prepare(&self) -> Result<(), SyncError> {
        self.clear().await?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error("create", &self.root, e))
    }

    async fn stage(&self, folder: &str, name: &str, contents: &[u8]) -> Result<PathBuf, SyncError> {
        let path = self.target_path(folder, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error("create", parent, e))?;
        }

        fs::write(&path, contents)
            .await
            .map_err(|e| Self::io_error("write", &path, e))?;
        Ok(path)
    }

    async fn list(&self) -> Result<Vec<LocalDocument>, SyncError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root))
            .await
            .map_err(|e| SyncError::Staging(e.to_string()))?
    }

    async fn read(&self, document: &LocalDocument) -> Result<Vec<u8>, SyncError> {
        fs::read(&document.path)
            .await
            .map_err(|e| Self::io_error("read", &document.path, e))
    }

    async fn clear(&self) -> Result<(), SyncError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error("remove", &self.root, e)),
        }
    }
}
