// =============================================================================
// DROPBOX CLIENT
// =============================================================================
//
// Talks to the Dropbox v2 HTTP API: RPC endpoints on api.dropboxapi.com take
// JSON bodies, content endpoints on content.dropboxapi.com take the arguments
// as JSON in the `Dropbox-API-Arg` header and the file bytes as the body.
//
// Short-lived access tokens work as-is. For unattended runs use a refresh
// token plus the app key; it is exchanged for an access token on demand.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::core::sync::{DocumentStore, SyncError};
use crate::core::versioning::{EntryKind, RemoteEntry};
use crate::infra::credentials::DropboxCredentials;

const TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Supplies bearer tokens for Dropbox calls.
pub struct DropboxAuth {
    credentials: DropboxCredentials,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl DropboxAuth {
    pub fn new(credentials: DropboxCredentials) -> Self {
        Self {
            credentials,
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_access_token(&self) -> Result<String, SyncError> {
        let (refresh_token, app_key) = match &self.credentials {
            DropboxCredentials::AccessToken(token) => return Ok(token.clone()),
            DropboxCredentials::RefreshToken {
                refresh_token,
                app_key,
            } => (refresh_token, app_key),
        };

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", app_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SyncError::Destination(format!(
                "Dropbox token refresh failed ({}): {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at: SystemTime::now()
                    + Duration::from_secs(token.expires_in.unwrap_or(4 * 60 * 60)),
            });
        }

        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<ApiEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    name: AccountName,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'a str,
    autorename: bool,
    mute: bool,
}

/// Dropbox v2 client exposing only what the sync needs.
pub struct DropboxClient {
    client: Client,
    auth: DropboxAuth,
    api_url: String,
    content_url: String,
}

impl DropboxClient {
    pub fn new(auth: DropboxAuth) -> Self {
        Self {
            client: Client::new(),
            auth,
            api_url: "https://api.dropboxapi.com/2".to_string(),
            content_url: "https://content.dropboxapi.com/2".to_string(),
        }
    }

    fn join_path(folder: &str, name: &str) -> String {
        format!("{}/{}", folder.trim_end_matches('/'), name)
    }

    fn map_entry(folder: &str, entry: ApiEntry) -> RemoteEntry {
        let kind = match entry.tag.as_str() {
            "file" => EntryKind::File,
            "folder" => EntryKind::Folder,
            _ => EntryKind::Other,
        };
        let path = entry
            .path_display
            .or(entry.path_lower)
            .unwrap_or_else(|| Self::join_path(folder, &entry.name));

        RemoteEntry {
            kind,
            name: entry.name,
            path,
            folder: folder.to_string(),
        }
    }

    async fn rpc(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, SyncError> {
        let token = self.auth.get_access_token().await?;
        self.client
            .post(format!("{}/{}", self.api_url, endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))
    }

    async fn error_for(endpoint: &str, resp: reqwest::Response) -> SyncError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        SyncError::Destination(format!("Dropbox {} failed ({}): {}", endpoint, status, text))
    }

    /// Fetches the account the token belongs to and returns its display name.
    pub async fn current_account(&self) -> Result<String, SyncError> {
        let token = self.auth.get_access_token().await?;
        // This endpoint takes no arguments and rejects a JSON body.
        let resp = self
            .client
            .post(format!("{}/users/get_current_account", self.api_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_for("users/get_current_account", resp).await);
        }

        let account: Account = resp
            .json()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))?;

        Ok(match account.email {
            Some(email) => format!("{} <{}>", account.name.display_name, email),
            None => account.name.display_name,
        })
    }
}

#[async_trait]
impl DocumentStore for DropboxClient {
    async fn list_folder(&self, folder: &str) -> Result<Vec<RemoteEntry>, SyncError> {
        let mut resp = self.rpc("files/list_folder", json!({ "path": folder })).await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            let text = resp.text().await.unwrap_or_default();
            if not_found_listing(status, &text) {
                tracing::debug!("Dropbox folder {} does not exist yet", folder);
                return Ok(Vec::new());
            }
            return Err(SyncError::Destination(format!(
                "Dropbox files/list_folder failed for {}: {}",
                folder, text
            )));
        }

        let mut entries = Vec::new();
        loop {
            if !resp.status().is_success() {
                return Err(Self::error_for("files/list_folder", resp).await);
            }

            let page: ListFolderResult = resp
                .json()
                .await
                .map_err(|e| SyncError::Destination(e.to_string()))?;
            entries.extend(page.entries.into_iter().map(|e| Self::map_entry(folder, e)));

            if !page.has_more {
                break;
            }
            resp = self
                .rpc("files/list_folder/continue", json!({ "cursor": page.cursor }))
                .await?;
        }

        Ok(entries)
    }

    async fn upload(&self, folder: &str, name: &str, contents: Vec<u8>) -> Result<(), SyncError> {
        let path = Self::join_path(folder, name);
        let arg = serde_json::to_string(&UploadArg {
            path: &path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        })
        .map_err(|e| SyncError::Destination(e.to_string()))?;

        let token = self.auth.get_access_token().await?;
        let resp = self
            .client
            .post(format!("{}/files/upload", self.content_url))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", http_header_safe(&arg))
            .header("Content-Type", "application/octet-stream")
            .body(contents)
            .send()
            .await
            .map_err(|e| SyncError::Destination(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_for("files/upload", resp).await);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), SyncError> {
        let resp = self.rpc("files/delete_v2", json!({ "path": path })).await?;
        if !resp.status().is_success() {
            return Err(Self::error_for("files/delete_v2", resp).await);
        }
        Ok(())
    }
}

/// A destination folder that doesn't exist yet simply has no entries.
/// Dropbox reports that as a 409 whose `error_summary` starts with
/// `path/not_found`; any other 409 is a real error.
fn not_found_listing(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT && body.contains("path/not_found")
}

/// Dropbox requires non-ASCII characters and DEL in `Dropbox-API-Arg` to be
/// escaped as `\uXXXX` so the header stays printable ASCII.
fn http_header_safe(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
