pub mod sync_models;
pub mod sync_service;

#[allow(unused_imports)]
pub use sync_models::{
    DocumentSource, DocumentStore, SourceFile, SourceFormat, StagingArea, SyncError, SyncReport,
};
#[allow(unused_imports)]
pub use sync_service::SyncService;
