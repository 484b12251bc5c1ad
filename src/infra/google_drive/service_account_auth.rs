// =============================================================================
// GOOGLE SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Exchanges a signed JWT for a short-lived OAuth2 access token, the flow
// Google uses for service accounts. No user interaction is involved.
//
// **Setup:**
// 1. Create a service account in Google Cloud Console and enable the Drive API
// 2. Create a JSON key for it and save it as `google-service-creds.json`
//    (or put its content in the `GOOGLE_SERVICE_ACCOUNT_JSON` secret in CI)
// 3. Share the `Resume` folder with the service account email
//    (looks like: name@project.iam.gserviceaccount.com), "Viewer" is enough

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service account JSON key that the JWT flow needs.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    /// Used as the JWT issuer.
    client_email: String,

    /// PEM-encoded RSA key.
    private_key: String,

    #[serde(default = "default_token_uri")]
    token_uri: String,
}

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    /// Max 1 hour after `iat`.
    exp: u64,
}

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

/// Authenticator that handles OAuth2 with service account credentials.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    scope: String,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Creates an authenticator from the service account key JSON.
    pub fn from_json(json: &str, scope: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let key: ServiceAccountKey = serde_json::from_str(json)?;
        Ok(Self {
            key,
            scope: scope.to_string(),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Gets a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + Duration::from_secs(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let response = self.fetch_new_token().await?;
        let lifetime = response.expires_in.unwrap_or(3600).min(3600);

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(CachedToken {
                token: response.access_token.clone(),
                expires_at: SystemTime::now() + Duration::from_secs(lifetime),
            });
        }

        Ok(response.access_token)
    }

    fn signed_assertion(&self, now: u64) -> Result<String, Box<dyn Error + Send + Sync>> {
        let claims = JwtClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn fetch_new_token(&self) -> Result<TokenResponse, Box<dyn Error + Send + Sync>> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let jwt = self.signed_assertion(now)?;

        tracing::debug!("Requesting Google access token for {}", self.key.client_email);

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(format!("Token exchange failed ({}): {}", status, text).into());
        }

        Ok(response.json().await?)
    }
}
