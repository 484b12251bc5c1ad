// Google Drive source.
// - `service_account_auth.rs` turns a service account key into access tokens.
// - `google_drive_client.rs` resolves folders, lists recent files and
//   downloads them (Google Docs are exported to PDF).

pub mod google_drive_client;
pub mod service_account_auth;

pub use google_drive_client::GoogleDriveClient;
pub use service_account_auth::{ServiceAccountAuth, DRIVE_READONLY_SCOPE};
