// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "credentials/mod.rs"]
pub mod credentials;

#[path = "google_drive/mod.rs"]
pub mod google_drive;

#[path = "dropbox/mod.rs"]
pub mod dropbox;

#[path = "staging/mod.rs"]
pub mod staging;
