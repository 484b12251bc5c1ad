pub mod local_staging;

pub use local_staging::LocalStagingArea;
