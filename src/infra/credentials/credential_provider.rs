// Loads API credentials for whichever `CredentialSource` the config resolved.
//
// **Local files:**
// - `google-service-creds.json` - Service account key downloaded from Google Cloud
// - `dropbox-creds.json` - Either `{"token": "..."}` or
//   `{"refresh_token": "...", "APP_KEY": "..."}`
//
// **GitHub Actions secrets:**
// - `GOOGLE_SERVICE_ACCOUNT_JSON` - The service account key content
// - `DROPBOX_TOKEN` - Access token, OR
// - `DROPBOX_REFRESH_TOKEN` + `DROPBOX_APP_KEY` - Long-lived refresh token

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::core::config::CredentialSource;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read {path}: {message}")]
    Unreadable { path: String, message: String },
    #[error("Missing credential: {0}")]
    Missing(String),
    #[error("Invalid credential file {path}: {message}")]
    Invalid { path: String, message: String },
}

/// How to authenticate against Dropbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropboxCredentials {
    AccessToken(String),
    RefreshToken {
        refresh_token: String,
        app_key: String,
    },
}

#[derive(Debug, Clone)]
pub struct Credentials {
    /// Raw service account key JSON.
    pub google_service_account: String,
    pub dropbox: DropboxCredentials,
}

#[derive(Debug, Deserialize)]
struct DropboxCredsFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, rename = "APP_KEY", alias = "app_key")]
    app_key: Option<String>,
}

impl DropboxCredsFile {
    fn into_credentials(self) -> Option<DropboxCredentials> {
        if let Some(token) = self.token.filter(|t| !t.is_empty()) {
            return Some(DropboxCredentials::AccessToken(token));
        }

        match (self.refresh_token, self.app_key) {
            (Some(refresh_token), Some(app_key))
                if !refresh_token.is_empty() && !app_key.is_empty() =>
            {
                Some(DropboxCredentials::RefreshToken {
                    refresh_token,
                    app_key,
                })
            }
            _ => None,
        }
    }
}

pub struct CredentialProvider;

impl CredentialProvider {
    pub async fn load(source: &CredentialSource) -> Result<Credentials, CredentialError> {
        match source {
            CredentialSource::Environment => {
                let vars: HashMap<String, String> = std::env::vars().collect();
                Self::from_vars(&vars)
            }
            CredentialSource::LocalFiles {
                google_key,
                dropbox_creds,
            } => Self::from_files(google_key, dropbox_creds).await,
        }
    }

    /// Reads secrets injected as environment variables (CI runs).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Credentials, CredentialError> {
        let get = |name: &str| vars.get(name).filter(|v| !v.trim().is_empty()).cloned();

        let google_service_account = get("GOOGLE_SERVICE_ACCOUNT_JSON")
            .ok_or_else(|| CredentialError::Missing("GOOGLE_SERVICE_ACCOUNT_JSON".to_string()))?;

        let dropbox = DropboxCredsFile {
            token: get("DROPBOX_TOKEN"),
            refresh_token: get("DROPBOX_REFRESH_TOKEN"),
            app_key: get("DROPBOX_APP_KEY"),
        }
        .into_credentials()
        .ok_or_else(|| {
            CredentialError::Missing(
                "DROPBOX_TOKEN or DROPBOX_REFRESH_TOKEN + DROPBOX_APP_KEY".to_string(),
            )
        })?;

        Ok(Credentials {
            google_service_account,
            dropbox,
        })
    }

    /// Reads the JSON credential files kept next to the binary (local runs).
    pub async fn from_files(
        google_key: &Path,
        dropbox_creds: &Path,
    ) -> Result<Credentials, CredentialError> {
        let google_service_account = read_file(google_key).await?;

        let dropbox_text = read_file(dropbox_creds).await?;
        let parsed: DropboxCredsFile =
            serde_json::from_str(&dropbox_text).map_err(|e| CredentialError::Invalid {
                path: dropbox_creds.display().to_string(),
                message: e.to_string(),
            })?;
        let dropbox = parsed
            .into_credentials()
            .ok_or_else(|| CredentialError::Invalid {
                path: dropbox_creds.display().to_string(),
                message: "expected \"token\" or \"refresh_token\" with \"APP_KEY\"".to_string(),
            })?;

        Ok(Credentials {
            google_service_account,
            dropbox,
        })
    }
}

async fn read_file(path: &Path) -> Result<String, CredentialError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CredentialError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}
