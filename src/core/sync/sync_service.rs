use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::sync_models::{DocumentSource, DocumentStore, StagingArea, SyncError, SyncReport};
use crate::core::config::{FolderMapping, SyncConfig};
use crate::core::versioning::{reconcile, RemoteEntry};

/// Copies recently changed documents from the source into the destination,
/// replacing older-dated copies on the way.
///
/// Everything runs sequentially: download, reconcile, upload, delete the
/// stale copies whose replacement uploaded, clean up. The orchestration
/// lives here so it can be tested without HTTP or the filesystem.
pub struct SyncService<S: DocumentSource, D: DocumentStore, L: StagingArea> {
    source: S,
    store: D,
    staging: L,
}

impl<S, D, L> SyncService<S, D, L>
where
    S: DocumentSource,
    D: DocumentStore,
    L: StagingArea,
{
    pub fn new(source: S, store: D, staging: L) -> Self {
        Self {
            source,
            store,
            staging,
        }
    }

    pub async fn run(&self, config: &SyncConfig) -> Result<SyncReport, SyncError> {
        self.run_at(config, Utc::now()).await
    }

    /// Runs one pass as if the current time were `now`.
    pub async fn run_at(
        &self,
        config: &SyncConfig,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        self.staging.prepare().await?;

        let mut report = SyncReport::default();
        let outcome = self.sync_staged(config, now, &mut report).await;

        // The staging area is scratch space; never leave it behind.
        if let Err(e) = self.staging.clear().await {
            tracing::warn!("Failed to clean up staging area: {}", e);
        }

        outcome?;

        tracing::info!(
            staged = report.staged,
            fetch_failures = report.fetch_failures,
            superseded = report.superseded,
            delete_failures = report.delete_failures,
            uploaded = report.uploaded,
            upload_failures = report.upload_failures,
            "Sync finished"
        );

        Ok(report)
    }

    async fn sync_staged(
        &self,
        config: &SyncConfig,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let since = now - config.lookback;

        for folder in &config.folders {
            self.stage_folder(folder, since, report).await?;
        }

        let local = self.staging.list().await?;
        if local.is_empty() {
            tracing::info!("No recently modified files found since {}", since);
            tracing::info!("No files to update");
            return Ok(());
        }

        let mut remote: Vec<RemoteEntry> = Vec::new();
        for folder in &config.folders {
            let path = config.dropbox_folder(&folder.destination);
            let entries = self.store.list_folder(&path).await?;
            tracing::debug!("Listed {} entries in {}", entries.len(), path);
            remote.extend(entries);
        }

        let reconciliation = reconcile(&local, &remote);

        // A stale copy is only deleted once its replacement has uploaded.
        let mut uploaded: HashSet<&str> = HashSet::new();
        let mut failed: HashSet<&str> = HashSet::new();

        for document in &local {
            let result = match self.staging.read(document).await {
                Ok(contents) => {
                    let folder = config.dropbox_folder(&document.folder);
                    self.store.upload(&folder, &document.name, contents).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    report.uploaded += 1;
                    uploaded.insert(document.name.as_str());
                    tracing::info!("Uploaded '{}' to {}", document.name, document.folder);
                }
                Err(e) => {
                    report.upload_failures += 1;
                    failed.insert(document.name.as_str());
                    tracing::error!("Failed to upload '{}': {}", document.name, e);
                }
            }
        }

        if reconciliation.is_empty() {
            tracing::info!("No files to update");
        }

        for supersession in &reconciliation.supersessions {
            let stale = &supersession.stale;
            let replacement = supersession.replaced_by.as_str();
            if !uploaded.contains(replacement) || failed.contains(replacement) {
                tracing::warn!(
                    "Keeping '{}' because '{}' was not uploaded",
                    stale.name,
                    replacement
                );
                continue;
            }

            match self.store.delete(&stale.path).await {
                Ok(()) => {
                    report.superseded += 1;
                    tracing::info!("Removed '{}' (superseded by '{}')", stale.name, replacement);
                }
                Err(e) => {
                    report.delete_failures += 1;
                    tracing::error!("Failed to delete '{}': {}", stale.name, e);
                }
            }
        }

        Ok(())
    }

    async fn stage_folder(
        &self,
        folder: &FolderMapping,
        since: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let folder_id = match &folder.drive_folder_id {
            Some(id) => id.clone(),
            None => self.source.resolve_folder(&folder.destination).await?,
        };

        let files = self.source.list_recent(&folder_id, since).await?;
        tracing::info!(
            "Found {} recently modified file(s) in {}",
            files.len(),
            folder.destination
        );

        let mut staged_names: HashSet<String> = HashSet::new();

        for file in files {
            let name = file.staged_name();
            if let Some(modified_at) = file.modified_at {
                tracing::debug!("'{}' last modified {}", file.name, modified_at);
            }
            let staged = match self.source.fetch(&file).await {
                Ok(contents) => {
                    self.staging
                        .stage(&folder.destination, &name, &contents)
                        .await
                }
                Err(e) => Err(e),
            };

            match staged {
                Ok(path) => {
                    if staged_names.insert(name.clone()) {
                        report.staged += 1;
                        tracing::debug!("Staged '{}' at {}", name, path.display());
                    } else {
                        tracing::warn!(
                            "'{}' appears more than once in {}, keeping the later copy",
                            name,
                            folder.destination
                        );
                    }
                }
                Err(e) => {
                    report.fetch_failures += 1;
                    tracing::error!("Failed to download '{}': {}", name, e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::sync_models::{SourceFile, SourceFormat};
    use crate::core::versioning::{EntryKind, LocalDocument};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig::from_vars(&HashMap::new()).unwrap()
    }

    #[derive(Default)]
    struct FakeSource {
        folders: HashMap<String, String>,
        files: HashMap<String, Vec<SourceFile>>,
        broken: HashSet<String>,
        listed_since: Mutex<Vec<DateTime<Utc>>>,
    }

    impl FakeSource {
        fn with_folder(mut self, path: &str, id: &str) -> Self {
            self.folders.insert(path.to_string(), id.to_string());
            self
        }

        fn with_file(mut self, folder_id: &str, name: &str, format: SourceFormat) -> Self {
            let files = self.files.entry(folder_id.to_string()).or_default();
            let id = format!("{}-{}", folder_id, files.len());
            files.push(SourceFile {
                id,
                name: name.to_string(),
                format,
                modified_at: Some(now() - Duration::days(1)),
            });
            self
        }
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        async fn resolve_folder(&self, path: &str) -> Result<String, SyncError> {
            self.folders
                .get(path)
                .cloned()
                .ok_or_else(|| SyncError::Source(format!("Folder not found: {}", path)))
        }

        async fn list_recent(
            &self,
            folder_id: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<SourceFile>, SyncError> {
            self.listed_since.lock().unwrap().push(since);
            Ok(self
                .files
                .get(folder_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f.modified_at.map_or(false, |m| m > since))
                .collect())
        }

        async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, SyncError> {
            if self.broken.contains(&file.name) {
                return Err(SyncError::Source("export failed".to_string()));
            }
            Ok(file.name.clone().into_bytes())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        entries: Mutex<Vec<RemoteEntry>>,
        undeletable: HashSet<String>,
        full: bool,
        deleted: Mutex<Vec<String>>,
        uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl FakeStore {
        fn with_file(self, folder: &str, name: &str) -> Self {
            self.entries.lock().unwrap().push(RemoteEntry::file(
                folder,
                name,
                &format!("{}/{}", folder, name),
            ));
            self
        }

        fn names_in(&self, folder: &str) -> Vec<String> {
            let mut names: Vec<String> = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.folder == folder)
                .map(|e| e.name.clone())
                .collect();
            names.sort();
            names
        }
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, SyncError> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.folder == folder)
                .cloned()
                .collect())
        }

        async fn upload(
            &self,
            folder: &str,
            name: &str,
            contents: Vec<u8>,
        ) -> Result<(), SyncError> {
            if self.full {
                return Err(SyncError::Destination("insufficient_space".to_string()));
            }
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|e| !(e.folder == folder && e.name == name));
            entries.push(RemoteEntry::file(folder, name, &format!("{}/{}", folder, name)));
            self.uploads
                .lock()
                .unwrap()
                .push((folder.to_string(), name.to_string(), contents));
            Ok(())
        }

        async fn delete(&self, path: &str) -> Result<(), SyncError> {
            if self.undeletable.contains(path) {
                return Err(SyncError::Destination("path/not_found".to_string()));
            }
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|e| e.path != path);
            if entries.len() == before {
                return Err(SyncError::Destination("path/not_found".to_string()));
            }
            self.deleted.lock().unwrap().push(path.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStaging {
        files: Mutex<Vec<(LocalDocument, Vec<u8>)>>,
        prepared: Mutex<usize>,
        cleared: Mutex<usize>,
    }

    #[async_trait]
    impl StagingArea for MemoryStaging {
        async fn prepare(&self) -> Result<(), SyncError> {
            *self.prepared.lock().unwrap() += 1;
            self.files.lock().unwrap().clear();
            Ok(())
        }

        async fn stage(
            &self,
            folder: &str,
            name: &str,
            contents: &[u8],
        ) -> Result<PathBuf, SyncError> {
            let path = PathBuf::from(folder).join(name);
            let document = LocalDocument {
                name: name.to_string(),
                folder: folder.to_string(),
                path: path.clone(),
            };
            let mut files = self.files.lock().unwrap();
            files.retain(|(d, _)| d.path != path);
            files.push((document, contents.to_vec()));
            Ok(path)
        }

        async fn list(&self) -> Result<Vec<LocalDocument>, SyncError> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(d, _)| d.clone())
                .collect())
        }

        async fn read(&self, document: &LocalDocument) -> Result<Vec<u8>, SyncError> {
            self.files
                .lock()
                .unwrap()
                .iter()
                .find(|(d, _)| d == document)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| SyncError::Staging("missing".to_string()))
        }

        async fn clear(&self) -> Result<(), SyncError> {
            *self.cleared.lock().unwrap() += 1;
            self.files.lock().unwrap().clear();
            Ok(())
        }
    }

    fn resume_source() -> FakeSource {
        FakeSource::default()
            .with_folder("Resume", "root-id")
            .with_folder("Resume/Targeted", "targeted-id")
    }

    #[tokio::test]
    async fn stale_copies_are_replaced_and_new_files_uploaded() {
        let source = resume_source()
            .with_file("root-id", "Resume (Mar 2024)", SourceFormat::NativeDocument)
            .with_file(
                "targeted-id",
                "Cover Letter - Acme (Mar 2024, v2).pdf",
                SourceFormat::Blob,
            );
        let store = FakeStore::default()
            .with_file("/Resume", "Resume (Jan 2024).pdf")
            .with_file("/Resume", "Resume (Jan 2024, Software).pdf")
            .with_file("/Resume/Targeted", "Cover Letter - Acme (Dec 2023, v2).pdf");

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(
            report,
            SyncReport {
                staged: 2,
                superseded: 2,
                uploaded: 2,
                ..SyncReport::default()
            }
        );
        assert_eq!(
            service.store.names_in("/Resume"),
            vec!["Resume (Jan 2024, Software).pdf", "Resume (Mar 2024).pdf"]
        );
        assert_eq!(
            service.store.names_in("/Resume/Targeted"),
            vec!["Cover Letter - Acme (Mar 2024, v2).pdf"]
        );

        let uploads = service.store.uploads.lock().unwrap();
        assert_eq!(uploads[0].2, b"Resume (Mar 2024)".to_vec());
    }

    #[tokio::test]
    async fn files_outside_the_lookback_window_are_ignored() {
        let mut source =
            resume_source().with_file("root-id", "Resume (Feb 2024).pdf", SourceFormat::Blob);
        for file in source.files.get_mut("root-id").unwrap() {
            file.modified_at = Some(now() - Duration::days(8));
        }
        let store = FakeStore::default().with_file("/Resume", "Resume (Jan 2024).pdf");

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert_eq!(
            service.store.names_in("/Resume"),
            vec!["Resume (Jan 2024).pdf"]
        );
        assert!(service
            .source
            .listed_since
            .lock()
            .unwrap()
            .iter()
            .all(|since| *since == now() - Duration::days(7)));
    }

    #[tokio::test]
    async fn same_month_copies_are_overwritten_not_deleted() {
        let source =
            resume_source().with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob);
        let store = FakeStore::default().with_file("/Resume", "Resume (Mar 2024).pdf");

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report.superseded, 0);
        assert_eq!(report.uploaded, 1);
        assert!(service.store.deleted.lock().unwrap().is_empty());
        assert_eq!(
            service.store.names_in("/Resume"),
            vec!["Resume (Mar 2024).pdf"]
        );
    }

    #[tokio::test]
    async fn delete_failures_do_not_stop_the_run() {
        let source = resume_source()
            .with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob)
            .with_file("root-id", "CV (Mar 2024).pdf", SourceFormat::Blob);
        let mut store = FakeStore::default()
            .with_file("/Resume", "Resume (Jan 2024).pdf")
            .with_file("/Resume", "CV (Jan 2024).pdf");
        store
            .undeletable
            .insert("/Resume/Resume (Jan 2024).pdf".to_string());

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report.delete_failures, 1);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.uploaded, 2);
        assert_eq!(
            *service.store.deleted.lock().unwrap(),
            vec!["/Resume/CV (Jan 2024).pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_supersessions_are_attempted_independently() {
        let source = resume_source()
            .with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob)
            .with_file("targeted-id", "Resume (Feb 2024).pdf", SourceFormat::Blob);
        let store = FakeStore::default().with_file("/Resume", "Resume (Jan 2024).pdf");

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        // Both local files supersede the same remote; the second delete finds it gone.
        assert_eq!(report.superseded, 1);
        assert_eq!(report.delete_failures, 1);
        assert_eq!(report.uploaded, 2);
    }

    #[tokio::test]
    async fn failed_upload_keeps_the_older_copy() {
        let source =
            resume_source().with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob);
        let mut store = FakeStore::default().with_file("/Resume", "Resume (Jan 2024).pdf");
        store.full = true;

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report.upload_failures, 1);
        assert_eq!(report.superseded, 0);
        assert_eq!(report.delete_failures, 0);
        assert!(service.store.deleted.lock().unwrap().is_empty());
        assert_eq!(
            service.store.names_in("/Resume"),
            vec!["Resume (Jan 2024).pdf"]
        );
    }

    #[tokio::test]
    async fn duplicate_source_names_are_staged_once() {
        let source = resume_source()
            .with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob)
            .with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob);

        let service = SyncService::new(source, FakeStore::default(), MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report.staged, 1);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.fetch_failures, 0);
    }

    #[tokio::test]
    async fn fetch_failures_skip_only_that_file() {
        let mut source = resume_source()
            .with_file("root-id", "Resume (Mar 2024)", SourceFormat::NativeDocument)
            .with_file("root-id", "Notes.txt", SourceFormat::Blob);
        source.broken.insert("Resume (Mar 2024)".to_string());
        let store = FakeStore::default().with_file("/Resume", "Resume (Jan 2024).pdf");

        let service = SyncService::new(source, store, MemoryStaging::default());
        let report = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(report.fetch_failures, 1);
        assert_eq!(report.staged, 1);
        assert_eq!(report.superseded, 0);
        assert_eq!(
            service.store.names_in("/Resume"),
            vec!["Notes.txt", "Resume (Jan 2024).pdf"]
        );
    }

    #[tokio::test]
    async fn pinned_folder_ids_skip_resolution() {
        let source = FakeSource::default().with_file(
            "pinned",
            "Resume (Mar 2024).pdf",
            SourceFormat::Blob,
        );
        let mut vars = HashMap::new();
        vars.insert("RESUME_SYNC_FOLDERS".to_string(), "Resume=pinned".to_string());
        let config = SyncConfig::from_vars(&vars).unwrap();

        let service = SyncService::new(source, FakeStore::default(), MemoryStaging::default());
        let report = service.run_at(&config, now()).await.unwrap();

        assert_eq!(report.uploaded, 1);
    }

    #[tokio::test]
    async fn staging_is_cleared_even_when_the_source_fails() {
        let source = FakeSource::default().with_folder("Resume", "root-id");

        let service = SyncService::new(source, FakeStore::default(), MemoryStaging::default());
        let result = service.run_at(&config(), now()).await;

        assert!(matches!(result, Err(SyncError::Source(_))));
        assert_eq!(*service.staging.prepared.lock().unwrap(), 1);
        assert_eq!(*service.staging.cleared.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_run_has_nothing_to_supersede() {
        let source =
            resume_source().with_file("root-id", "Resume (Mar 2024).pdf", SourceFormat::Blob);
        let store = FakeStore::default()
            .with_file("/Resume", "Resume (Jan 2024).pdf")
            .with_file("/Resume/Targeted", "Folder (Jan 2020)");
        store.entries.lock().unwrap()[1].kind = EntryKind::Folder;

        let service = SyncService::new(source, store, MemoryStaging::default());
        let first = service.run_at(&config(), now()).await.unwrap();
        let second = service.run_at(&config(), now()).await.unwrap();

        assert_eq!(first.superseded, 1);
        assert_eq!(second.superseded, 0);
        assert_eq!(second.delete_failures, 0);
        assert_eq!(second.uploaded, 1);
    }
}
