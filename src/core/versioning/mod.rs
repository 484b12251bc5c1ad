// Version reconciliation.
// - `version_marker.rs` parses the `(<Mon> <Year>[, <tag>])` filename convention.
// - `reconciler.rs` decides which remote copies are superseded by staged files.

pub mod reconciler;
pub mod version_marker;

#[allow(unused_imports)]
pub use reconciler::{
    reconcile, EntryKind, LocalDocument, Reconciliation, RemoteEntry, Supersession,
};
#[allow(unused_imports)]
pub use version_marker::{parse_versioned_name, VersionMarker, VersionedName};
