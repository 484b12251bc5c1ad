use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::service_account_auth::ServiceAccountAuth;
use crate::core::sync::{DocumentSource, SourceFile, SourceFormat, SyncError};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";
const PDF_MIME: &str = "application/pdf";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    modified_time: Option<String>,
}

/// Minimal Drive v3 REST client covering folder lookup, listing, download and
/// PDF export.
pub struct GoogleDriveClient {
    client: Client,
    auth: ServiceAccountAuth,
    base_url: String,
}

impl GoogleDriveClient {
    pub fn new(auth: ServiceAccountAuth) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://www.googleapis.com/drive/v3".to_string(),
        }
    }

    /// Escapes a value for use inside a single-quoted Drive query literal.
    fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn folder_query(name: &str, parent_id: Option<&str>) -> String {
        let mut query = format!(
            "name = {} and mimeType = {} and trashed = false",
            Self::quote(name),
            Self::quote(FOLDER_MIME)
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and {} in parents", Self::quote(parent)));
        }
        query
    }

    fn recent_files_query(folder_id: &str, since: DateTime<Utc>) -> String {
        format!(
            "{} in parents and trashed = false and modifiedTime > {}",
            Self::quote(folder_id),
            Self::quote(&since.to_rfc3339_opts(SecondsFormat::Secs, true))
        )
    }

    fn map_file(file: DriveFile) -> Option<SourceFile> {
        let format = if file.mime_type == GOOGLE_DOC_MIME {
            SourceFormat::NativeDocument
        } else if file.mime_type.starts_with(GOOGLE_APPS_PREFIX) {
            tracing::debug!("Skipping '{}' ({})", file.name, file.mime_type);
            return None;
        } else {
            SourceFormat::Blob
        };

        let modified_at = file
            .modified_time
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(SourceFile {
            id: file.id,
            name: file.name,
            format,
            modified_at,
        })
    }

    async fn bearer(&self) -> Result<String, SyncError> {
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|e| SyncError::Source(e.to_string()))?;
        Ok(format!("Bearer {}", token))
    }

    async fn list_files(&self, query: &str) -> Result<Vec<DriveFile>, SyncError> {
        let url = format!("{}/files", self.base_url);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", LIST_FIELDS.to_string()),
                ("pageSize", "100".to_string()),
                ("supportsAllDrives", "true".to_string()),
                ("includeItemsFromAllDrives", "true".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let resp = self
                .client
                .get(&url)
                .header("Authorization", self.bearer().await?)
                .query(&params)
                .send()
                .await
                .map_err(|e| SyncError::Source(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(SyncError::Source(format!(
                    "Drive list failed ({}): {}",
                    status, text
                )));
            }

            let page: FileList = resp
                .json()
                .await
                .map_err(|e| SyncError::Source(e.to_string()))?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all_files)
    }

    async fn get_bytes(&self, url: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, SyncError> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", self.bearer().await?)
            .query(params)
            .send()
            .await
            .map_err(|e| SyncError::Source(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Source(format!(
                "Drive download failed ({}): {}",
                status, text
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SyncError::Source(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DocumentSource for GoogleDriveClient {
    async fn resolve_folder(&self, path: &str) -> Result<String, SyncError> {
        let mut parent: Option<String> = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let query = Self::folder_query(segment, parent.as_deref());
            let matches = self.list_files(&query).await?;

            if matches.len() > 1 {
                tracing::warn!(
                    "{} Drive folders named '{}', using the first",
                    matches.len(),
                    segment
                );
            }

            let folder = matches.into_iter().next().ok_or_else(|| {
                SyncError::Source(format!(
                    "Drive folder '{}' not found (is it shared with {}?)",
                    path,
                    self.auth.client_email()
                ))
            })?;
            parent = Some(folder.id);
        }

        let id = parent.ok_or_else(|| SyncError::Source("Empty folder path".to_string()))?;
        tracing::debug!("Resolved Drive folder {} -> {}", path, id);
        Ok(id)
    }

    async fn list_recent(
        &self,
        folder_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SourceFile>, SyncError> {
        let files = self
            .list_files(&Self::recent_files_query(folder_id, since))
            .await?;
        Ok(files.into_iter().filter_map(Self::map_file).collect())
    }

    async fn fetch(&self, file: &SourceFile) -> Result<Vec<u8>, SyncError> {
        match file.format {
            SourceFormat::NativeDocument => {
                tracing::debug!("Exporting '{}' as PDF", file.name);
                let url = format!("{}/files/{}/export", self.base_url, file.id);
                self.get_bytes(&url, &[("mimeType", PDF_MIME)]).await
            }
            SourceFormat::Blob => {
                tracing::debug!("Downloading '{}'", file.name);
                let url = format!("{}/files/{}", self.base_url, file.id);
                self.get_bytes(&url, &[("alt", "media"), ("supportsAllDrives", "true")])
                    .await
            }
        }
    }
}
