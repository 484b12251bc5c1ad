// Sync configuration, resolved once at startup from environment variables.
//
// **Environment Variables:**
// - `RESUME_SYNC_FOLDERS` - Comma-separated folder paths, optionally pinned to a
//   Drive folder id with `path=id` (default: `Resume,Resume/Targeted`)
// - `RESUME_SYNC_LOOKBACK_DAYS` - Only files modified this recently are copied (default: 7)
// - `RESUME_SYNC_STAGING_DIR` - Scratch directory for downloads (default: `staging`)
// - `DROPBOX_ROOT` - Prefix for every Dropbox path (default: account root)
// - `GITHUB_ACTIONS` - When `true`, credentials come from env secrets instead of files
// - `GOOGLE_SERVICE_ACCOUNT_KEY` / `DROPBOX_CREDS_FILE` - Credential file overrides

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

pub const DEFAULT_FOLDERS: &str = "Resume,Resume/Targeted";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_STAGING_DIR: &str = "staging";
pub const DEFAULT_GOOGLE_KEY_FILE: &str = "google-service-creds.json";
pub const DEFAULT_DROPBOX_CREDS_FILE: &str = "dropbox-creds.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No folders configured to sync")]
    NoFolders,
    #[error("Invalid folder entry '{0}'")]
    InvalidFolder(String),
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// One tracked folder. The same logical path is used in Drive and Dropbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMapping {
    /// Slash-separated folder path, e.g. `Resume/Targeted`.
    pub destination: String,
    /// Skips Drive path lookup when set.
    pub drive_folder_id: Option<String>,
}

/// Where API credentials are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// CI runs: secrets are injected as environment variables.
    Environment,
    /// Local runs: JSON credential files next to the binary.
    LocalFiles {
        google_key: PathBuf,
        dropbox_creds: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub folders: Vec<FolderMapping>,
    pub lookback: Duration,
    pub staging_dir: PathBuf,
    pub dropbox_root: String,
    pub credentials: CredentialSource,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Builds the config from an explicit variable map so tests don't touch
    /// the process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let folders = parse_folders(get("RESUME_SYNC_FOLDERS").unwrap_or(DEFAULT_FOLDERS))?;

        let lookback = match get("RESUME_SYNC_LOOKBACK_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|days| *days > 0)
                .and_then(Duration::try_days)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "RESUME_SYNC_LOOKBACK_DAYS",
                    value: raw.to_string(),
                })?,
            None => Duration::days(DEFAULT_LOOKBACK_DAYS),
        };

        let staging_dir =
            PathBuf::from(get("RESUME_SYNC_STAGING_DIR").unwrap_or(DEFAULT_STAGING_DIR));
        let dropbox_root = get("DROPBOX_ROOT")
            .map(|root| root.trim_matches('/').to_string())
            .unwrap_or_default();

        let credentials = if get("GITHUB_ACTIONS") == Some("true") {
            CredentialSource::Environment
        } else {
            CredentialSource::LocalFiles {
                google_key: PathBuf::from(
                    get("GOOGLE_SERVICE_ACCOUNT_KEY").unwrap_or(DEFAULT_GOOGLE_KEY_FILE),
                ),
                dropbox_creds: PathBuf::from(
                    get("DROPBOX_CREDS_FILE").unwrap_or(DEFAULT_DROPBOX_CREDS_FILE),
                ),
            }
        };

        Ok(Self {
            folders,
            lookback,
            staging_dir,
            dropbox_root,
            credentials,
        })
    }

    /// Absolute Dropbox path of a destination folder.
    pub fn dropbox_folder(&self, folder: &str) -> String {
        if self.dropbox_root.is_empty() {
            format!("/{}", folder)
        } else {
            format!("/{}/{}", self.dropbox_root, folder)
        }
    }
}

fn parse_folders(raw: &str) -> Result<Vec<FolderMapping>, ConfigError> {
    let mut folders = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (path, id) = match entry.split_once('=') {
            Some((path, id)) => (path.trim(), Some(id.trim())),
            None => (entry, None),
        };

        let destination = path.trim_matches('/');
        if destination.is_empty() || destination.split('/').any(|seg| seg.trim().is_empty()) {
            return Err(ConfigError::InvalidFolder(entry.to_string()));
        }
        if id == Some("") {
            return Err(ConfigError::InvalidFolder(entry.to_string()));
        }

        folders.push(FolderMapping {
            destination: destination.to_string(),
            drive_folder_id: id.map(str::to_string),
        });
    }

    if folders.is_empty() {
        return Err(ConfigError::NoFolders);
    }

    Ok(folders)
}
