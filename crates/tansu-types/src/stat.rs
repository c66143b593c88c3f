//! Entry records as reported by a backend and indexed by the driver.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::EntryId;

/// Open driver-specific metadata.
///
/// A backend that cannot store properties reports an empty map.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Leaf entry with byte content.
    File,
    /// Container entry with named children.
    Folder,
}

impl EntryKind {
    /// Returns true if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Returns true if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, EntryKind::Folder)
    }
}

/// Content hash of a file.
///
/// `Known` digests come from the backend (or from a cached computation);
/// `Unknown` means the driver's hash function has to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hash {
    Known(String),
    #[default]
    Unknown,
}

impl Hash {
    /// Returns true if the digest is available without computation.
    pub fn is_known(&self) -> bool {
        matches!(self, Hash::Known(_))
    }

    /// The stored digest, if any.
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Hash::Known(digest) => Some(digest),
            Hash::Unknown => None,
        }
    }
}

impl From<Option<String>> for Hash {
    fn from(digest: Option<String>) -> Self {
        match digest {
            Some(d) => Hash::Known(d),
            None => Hash::Unknown,
        }
    }
}

/// Folder materialization state.
///
/// An entry that is not in the driver index is "unloaded"; it has no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    /// Constructed and indexed, children not enumerated.
    Loaded,
    /// Children are being enumerated.
    Scanning,
    /// All children enumerated and linked.
    Scanned,
}

/// Backend-visible record of a single entry.
///
/// For folders `size` is always 0 here: folder sizes are derived by the
/// driver from descendant files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// Backend-assigned identity.
    pub id: EntryId,
    /// Name under every parent.
    pub name: String,
    /// File or folder.
    pub kind: EntryKind,
    /// Content length in bytes (files only).
    pub size: u64,
    /// Creation time.
    pub created: SystemTime,
    /// Last modification time.
    pub modified: SystemTime,
    /// Stored digest, if the backend has one.
    #[serde(default)]
    pub hash: Hash,
    /// Driver-specific metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl Stat {
    /// Record for a file, timestamped now.
    pub fn file(id: EntryId, name: impl Into<String>, size: u64) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            name: name.into(),
            kind: EntryKind::File,
            size,
            created: now,
            modified: now,
            hash: Hash::Unknown,
            properties: Properties::new(),
        }
    }

    /// Record for a folder, timestamped now.
    pub fn folder(id: EntryId, name: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            name: name.into(),
            kind: EntryKind::Folder,
            size: 0,
            created: now,
            modified: now,
            hash: Hash::Unknown,
            properties: Properties::new(),
        }
    }

    /// Attach a stored digest.
    pub fn with_hash(mut self, digest: impl Into<String>) -> Self {
        self.hash = Hash::Known(digest.into());
        self
    }

    /// Attach a single property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Set both timestamps.
    pub fn with_times(mut self, created: SystemTime, modified: SystemTime) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    /// Returns true if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entry_kind() {
        assert!(EntryKind::File.is_file());
        assert!(!EntryKind::File.is_folder());
        assert!(EntryKind::Folder.is_folder());
    }

    #[test]
    fn test_hash_variants() {
        let known = Hash::from(Some("abc123".to_string()));
        assert!(known.is_known());
        assert_eq!(known.as_known(), Some("abc123"));

        let unknown = Hash::from(None);
        assert!(!unknown.is_known());
        assert_eq!(unknown.as_known(), None);
        assert_eq!(Hash::default(), Hash::Unknown);
    }

    #[test]
    fn test_stat_builders() {
        let epoch = SystemTime::UNIX_EPOCH;
        let later = epoch + Duration::from_secs(60);
        let stat = Stat::file(EntryId::new("f1"), "report.txt", 12)
            .with_hash("abc123")
            .with_property("mode", serde_json::json!(0o644))
            .with_times(epoch, later);

        assert!(stat.is_file());
        assert_eq!(stat.size, 12);
        assert_eq!(stat.hash.as_known(), Some("abc123"));
        assert_eq!(stat.properties["mode"], serde_json::json!(0o644));
        assert_eq!(stat.created, epoch);
        assert_eq!(stat.modified, later);

        let folder = Stat::folder(EntryId::new("d1"), "docs");
        assert!(folder.is_folder());
        assert_eq!(folder.size, 0);
        assert!(folder.properties.is_empty());
    }

    #[test]
    fn test_stat_serde_skips_empty_properties() {
        let stat = Stat::folder(EntryId::new("d1"), "docs");
        let json = serde_json::to_value(&stat).unwrap();
        assert!(json.get("properties").is_none());
        let back: Stat = serde_json::from_value(json).unwrap();
        assert_eq!(back, stat);
    }
}
