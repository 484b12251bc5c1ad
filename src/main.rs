// This is the entry point of the resume sync.
//
// **Architecture Overview:**
// - `core/` = Sync logic (version reconciliation, pipeline, config)
// - `infra/` = Implementations of core traits (Google Drive, Dropbox, local disk)
//
// This file's job is to:
// 1. Load configuration
// 2. Resolve credentials for the environment we're running in
// 3. Initialize clients (dependency injection)
// 4. Run one sync pass

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pile of mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use anyhow::Context;

use crate::core::config::SyncConfig;
use crate::core::sync::SyncService;
use crate::infra::credentials::CredentialProvider;
use crate::infra::dropbox::{DropboxAuth, DropboxClient};
use crate::infra::google_drive::{GoogleDriveClient, ServiceAccountAuth, DRIVE_READONLY_SCOPE};
use crate::infra::staging::LocalStagingArea;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = SyncConfig::from_env().context("Invalid sync configuration")?;
    tracing::info!(
        folders = config.folders.len(),
        lookback_days = config.lookback.num_days(),
        "Starting resume sync"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Credentials are resolved from config and handed to the clients; the
    // sync service never sees them.

    let credentials = CredentialProvider::load(&config.credentials)
        .await
        .context("Failed to load API credentials")?;

    let google_auth =
        ServiceAccountAuth::from_json(&credentials.google_service_account, DRIVE_READONLY_SCOPE)
            .map_err(|e| anyhow::anyhow!("Invalid Google service account key: {}", e))?;
    tracing::info!("Using Google service account {}", google_auth.client_email());
    let drive = GoogleDriveClient::new(google_auth);

    let dropbox = DropboxClient::new(DropboxAuth::new(credentials.dropbox));
    let account = dropbox
        .current_account()
        .await
        .context("Failed to authenticate with Dropbox")?;
    tracing::info!("Connected to Dropbox as {}", account);

    let staging = LocalStagingArea::new(&config.staging_dir);

    let service = SyncService::new(drive, dropbox, staging);
    let report = service.run(&config).await.context("Sync failed")?;

    if report.fetch_failures + report.delete_failures + report.upload_failures > 0 {
        tracing::warn!("Sync finished with per-file failures, see errors above");
    }

    Ok(())
}
