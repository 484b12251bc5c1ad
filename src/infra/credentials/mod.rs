pub mod credential_provider;

#[allow(unused_imports)]
pub use credential_provider::{CredentialError, CredentialProvider, Credentials, DropboxCredentials};
