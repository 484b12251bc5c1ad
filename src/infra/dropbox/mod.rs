#[path = "dropbox_client.rs"]
pub mod dropbox_client;

pub use dropbox_client::{DropboxAuth, DropboxClient};
