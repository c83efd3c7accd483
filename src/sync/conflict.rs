//! Change detection between the last sync point and now.

use super::state::{SyncMapping, file_hash, normalize_newlines};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    #[default]
    None,
    LocalOnly,
    RemoteOnly,
    BothChanged,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictType::None => "none",
            ConflictType::LocalOnly => "local_only",
            ConflictType::RemoteOnly => "remote_only",
            ConflictType::BothChanged => "both_changed",
        })
    }
}

impl ConflictType {
    fn from_changes(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (true, true) => ConflictType::BothChanged,
            (true, false) => ConflictType::LocalOnly,
            (false, true) => ConflictType::RemoteOnly,
            (false, false) => ConflictType::None,
        }
    }
}

/// Classifies a sync point against current observations.
///
/// `current_hash` is `None` when the local file no longer exists, which
/// counts as no local change. A stored hash or revision that was never
/// recorded counts as changed.
pub fn classify(
    stored_hash: &str,
    current_hash: Option<&str>,
    stored_revision: u64,
    current_revision: u64,
) -> ConflictType {
    let local = current_hash.is_some_and(|hash| stored_hash.is_empty() || hash != stored_hash);
    let remote = stored_revision == 0 || current_revision > stored_revision;
    ConflictType::from_changes(local, remote)
}

/// Whether the file at `path` differs from what `mapping` last synced.
/// Only a file that no longer exists reports no change; a file that cannot
/// be read or decoded counts as changed.
pub fn has_local_changes(mapping: &SyncMapping, path: &Path) -> bool {
    match file_hash(path) {
        Ok(hash) => mapping.local_hash_at_sync.is_empty() || hash != mapping.local_hash_at_sync,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            warn!(path = %path.display(), %err, "unreadable local file");
            true
        }
    }
}

pub fn has_remote_changes(mapping: &SyncMapping, current_revision: u64) -> bool {
    mapping.remote_revision_at_sync == 0 || current_revision > mapping.remote_revision_at_sync
}

/// Classifies `mapping`, reading the local file at `path`.
pub fn detect(mapping: &SyncMapping, path: &Path, current_revision: u64) -> ConflictType {
    ConflictType::from_changes(
        has_local_changes(mapping, path),
        has_remote_changes(mapping, current_revision),
    )
}

/// Unified diff from the remote rendering to the local file, or an empty
/// string when both are equal after newline normalization.
pub fn diff(local: &str, remote: &str) -> String {
    let local = normalize_newlines(local);
    let remote = normalize_newlines(remote);
    if local == remote {
        return String::new();
    }
    TextDiff::from_lines(remote.as_str(), local.as_str())
        .unified_diff()
        .context_radius(3)
        .header("remote", "local")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state::content_hash;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classification_table() {
        let h = "h";
        let h2 = "h2";
        assert_eq!(classify(h, Some(h), 5, 5), ConflictType::None);
        assert_eq!(classify(h, Some(h2), 5, 5), ConflictType::LocalOnly);
        assert_eq!(classify(h, Some(h), 5, 7), ConflictType::RemoteOnly);
        assert_eq!(classify(h, Some(h2), 5, 7), ConflictType::BothChanged);
    }

    #[test]
    fn test_unrecorded_sync_point_counts_as_changed() {
        assert_eq!(classify("", Some("h"), 5, 5), ConflictType::LocalOnly);
        assert_eq!(classify("h", Some("h"), 0, 0), ConflictType::RemoteOnly);
        assert_eq!(classify("h", None, 5, 5), ConflictType::None);
    }

    #[test]
    fn test_local_change_detection_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "one\r\n").unwrap();
        let mut mapping = SyncMapping::new("a.md", "doc");
        mapping.local_hash_at_sync = content_hash("one\n");
        mapping.remote_revision_at_sync = 2;
        assert!(!has_local_changes(&mapping, &path));
        assert!(!has_remote_changes(&mapping, 2));
        assert_eq!(detect(&mapping, &path, 3), ConflictType::RemoteOnly);

        fs::write(&path, "two\n").unwrap();
        assert!(has_local_changes(&mapping, &path));
        assert!(!has_local_changes(&mapping, &dir.path().join("gone.md")));
    }

    #[test]
    fn test_undecodable_file_counts_as_changed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, b"Caf\xe9 local edit\n").unwrap();
        let mut mapping = SyncMapping::new("a.md", "doc");
        mapping.local_hash_at_sync = content_hash("Cafe\n");
        mapping.remote_revision_at_sync = 2;
        assert!(has_local_changes(&mapping, &path));
        assert_eq!(detect(&mapping, &path, 2), ConflictType::LocalOnly);
        assert_eq!(detect(&mapping, &path, 4), ConflictType::BothChanged);
    }

    #[test]
    fn test_diff_output() {
        assert_eq!(diff("a\r\nb\n", "a\nb\n"), "");
        let out = diff("a\nB\nc\n", "a\nb\nc\n");
        assert!(out.starts_with("--- remote\n+++ local\n"));
        assert!(out.contains("-b\n"));
        assert!(out.contains("+B\n"));
    }

    #[test]
    fn test_conflict_type_display() {
        assert_eq!(ConflictType::BothChanged.to_string(), "both_changed");
        assert_eq!(
            serde_json::to_value(ConflictType::LocalOnly).unwrap(),
            serde_json::json!("local_only")
        );
    }

    proptest! {
        #[test]
        fn prop_hash_invariant_under_crlf(lines in proptest::collection::vec("[a-z ]{0,12}", 0..8)) {
            let lf = lines.join("\n");
            let crlf = lines.join("\r\n");
            prop_assert_eq!(content_hash(&lf), content_hash(&crlf));
        }

        #[test]
        fn prop_same_sync_point_is_none(hash in "[0-9a-f]{8}", revision in 1u64..1000) {
            let kind = classify(&hash, Some(hash.as_str()), revision, revision);
            prop_assert_eq!(kind, ConflictType::None);
        }

        #[test]
        fn prop_newer_revision_is_remote_change(
            hash in "[0-9a-f]{8}",
            stored in 1u64..1000,
            bump in 1u64..10,
        ) {
            let kind = classify(&hash, Some(hash.as_str()), stored, stored + bump);
            prop_assert_eq!(kind, ConflictType::RemoteOnly);
        }
    }
}
