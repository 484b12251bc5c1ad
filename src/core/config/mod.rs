pub mod sync_config;

#[allow(unused_imports)]
pub use sync_config::{ConfigError, CredentialSource, FolderMapping, SyncConfig};
