// The core module contains all sync logic.
// Nothing in here performs HTTP or filesystem I/O directly.

#[path = "config/mod.rs"]
pub mod config;

#[path = "versioning/mod.rs"]
pub mod versioning;

#[path = "sync/mod.rs"]
pub mod sync;
