use std::path::PathBuf;

use super::version_marker::parse_versioned_name;

/// A freshly staged file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub name: String,
    /// Destination folder the file belongs to, e.g. `Resume/Targeted`.
    pub folder: String,
    pub path: PathBuf,
}

/// What kind of entry a destination listing returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
    Other,
}

/// One entry already present in a destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub kind: EntryKind,
    pub name: String,
    /// Full path in the destination store, used for deletion.
    pub path: String,
    pub folder: String,
}

impl RemoteEntry {
    pub fn file(folder: &str, name: &str, path: &str) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.to_string(),
            path: path.to_string(),
            folder: folder.to_string(),
        }
    }
}

/// A remote entry that is an older-dated copy of a local document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supersession {
    pub stale: RemoteEntry,
    /// Name of the local document that replaces it.
    pub replaced_by: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub supersessions: Vec<Supersession>,
}

impl Reconciliation {
    /// True when nothing needs to be deleted ("no files to update").
    pub fn is_empty(&self) -> bool {
        self.supersessions.is_empty()
    }

    pub fn stale_entries(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.supersessions.iter().map(|s| &s.stale)
    }
}

/// Decides which remote entries are superseded by the local documents.
///
/// Matching is purely by identity string; folders are not compared. A remote
/// file is selected when its identity equals a local document's identity and
/// its marker month is strictly earlier. Every qualifying (local, remote)
/// pair produces its own entry, so a remote matched by two locals appears
/// twice.
pub fn reconcile(local: &[LocalDocument], remote: &[RemoteEntry]) -> Reconciliation {
    let mut reconciliation = Reconciliation::default();

    for document in local {
        let Some(local_version) = parse_versioned_name(&document.name) else {
            tracing::debug!(file = %document.name, "No version marker, skipping comparison");
            continue;
        };

        for entry in remote.iter().filter(|e| e.kind == EntryKind::File) {
            let Some(remote_version) = parse_versioned_name(&entry.name) else {
                continue;
            };

            if remote_version.identity == local_version.identity
                && remote_version.marker.month < local_version.marker.month
            {
                tracing::debug!(
                    "'{}' ({}) supersedes '{}' ({})",
                    document.name,
                    local_version.marker.raw,
                    entry.name,
                    remote_version.marker.raw
                );
                reconciliation.supersessions.push(Supersession {
                    stale: entry.clone(),
                    replaced_by: document.name.clone(),
                });
            }
        }
    }

    reconciliation
}
