//! In-memory storage backend.
//!
//! Used for scratch trees and testing. All data is ephemeral.

use std::collections::HashMap;
use std::io::{self, Read};
use std::ops::Range;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use indexmap::IndexMap;
use tansu_types::{split_path, EntryId, EntryKind, Hash, Properties, Stat};

use super::error::{BackendError, BackendResult};
use super::{Backend, Link};

/// Entry in the memory store.
#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: EntryKind,
    data: Arc<[u8]>,
    parents: Vec<EntryId>,
    children: IndexMap<String, EntryId>,
    created: SystemTime,
    modified: SystemTime,
    hash: Hash,
    properties: Properties,
}

impl Node {
    fn new(name: &str, kind: EntryKind) -> Self {
        let now = SystemTime::now();
        Self {
            name: name.to_string(),
            kind,
            data: Arc::from(Vec::new()),
            parents: Vec::new(),
            children: IndexMap::new(),
            created: now,
            modified: now,
            hash: Hash::Unknown,
            properties: Properties::new(),
        }
    }

    fn stat(&self, id: &EntryId) -> Stat {
        Stat {
            id: id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            size: if self.kind.is_file() {
                self.data.len() as u64
            } else {
                0
            },
            created: self.created,
            modified: self.modified,
            hash: self.hash.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// A shared, immutable slice of file content.
///
/// Readers hold their own `Arc`, so a file deleted or rewritten while a
/// stream is open keeps serving the bytes it had when the stream opened.
struct Snapshot {
    data: Arc<[u8]>,
    range: Range<usize>,
}

impl AsRef<[u8]> for Snapshot {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }
}

/// In-memory storage backend.
///
/// Thread-safe via internal `RwLock`. Supports hard links of files and
/// folders, stored hashes and properties. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    root: EntryId,
    nodes: RwLock<HashMap<EntryId, Node>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new store containing only the root folder.
    pub fn new() -> Self {
        let root = EntryId::generate();
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), Node::new("", EntryKind::Folder));
        Self {
            root,
            nodes: RwLock::new(nodes),
        }
    }

    /// Id of the root folder.
    pub fn root_id(&self) -> &EntryId {
        &self.root
    }

    // ========================================================================
    // Seeding (content that exists before a driver mounts the store)
    // ========================================================================

    /// Create a file at `path`, creating parent folders as needed.
    ///
    /// An existing file at `path` is replaced in place (same id).
    pub fn seed_file(&self, path: &str, data: &[u8]) -> BackendResult<EntryId> {
        self.seed(path, Some(data), Hash::Unknown)
    }

    /// Like [`seed_file`](Self::seed_file), with a stored hash.
    pub fn seed_file_with_hash(
        &self,
        path: &str,
        data: &[u8],
        digest: &str,
    ) -> BackendResult<EntryId> {
        self.seed(path, Some(data), Hash::Known(digest.to_string()))
    }

    /// Create a folder at `path` (and its parents). Existing folders are reused.
    pub fn seed_folder(&self, path: &str) -> BackendResult<EntryId> {
        self.seed(path, None, Hash::Unknown)
    }

    /// Add a link to `entry` inside the folder at `folder_path`.
    pub fn seed_link(&self, entry: &EntryId, folder_path: &str) -> BackendResult<()> {
        let folder = self
            .resolve(folder_path)?
            .ok_or_else(|| BackendError::not_found(folder_path))?;
        let name = {
            let nodes = self.read_nodes()?;
            nodes
                .get(entry)
                .map(|n| n.name.clone())
                .ok_or_else(|| BackendError::not_found(entry.to_string()))?
        };
        self.link(entry, &folder, &name)
    }

    /// Remove the link at `path` behind any driver's back.
    pub fn seed_remove(&self, path: &str) -> BackendResult<()> {
        let segments = split_path(path);
        let (name, parent_segments) = segments
            .split_last()
            .ok_or_else(|| BackendError::other("cannot remove root"))?;
        let parent = self
            .resolve(&parent_segments.join("/"))?
            .ok_or_else(|| BackendError::not_found(path))?;
        let entry = self
            .resolve(path)?
            .ok_or_else(|| BackendError::not_found(path))?;
        self.unlink_any(&entry, &parent, name)
    }

    /// Set a property on an entry.
    pub fn set_property(
        &self,
        entry: &EntryId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> BackendResult<()> {
        let mut nodes = self.write_nodes()?;
        let node = nodes
            .get_mut(entry)
            .ok_or_else(|| BackendError::not_found(entry.to_string()))?;
        node.properties.insert(key.into(), value);
        Ok(())
    }

    /// Resolve a `/`-separated path from the root.
    pub fn resolve(&self, path: &str) -> BackendResult<Option<EntryId>> {
        let nodes = self.read_nodes()?;
        let mut current = self.root.clone();
        for segment in split_path(path) {
            let next = nodes
                .get(&current)
                .and_then(|n| n.children.get(segment))
                .cloned();
            match next {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Returns true if the store still holds the entry.
    pub fn contains(&self, entry: &EntryId) -> bool {
        self.read_nodes()
            .map(|nodes| nodes.contains_key(entry))
            .unwrap_or(false)
    }

    /// Number of links pointing at the entry (0 if gone).
    pub fn link_count(&self, entry: &EntryId) -> usize {
        self.read_nodes()
            .ok()
            .and_then(|nodes| nodes.get(entry).map(|n| n.parents.len()))
            .unwrap_or(0)
    }

    fn seed(&self, path: &str, data: Option<&[u8]>, hash: Hash) -> BackendResult<EntryId> {
        let segments = split_path(path);
        let (leaf, folders) = match segments.split_last() {
            Some(split) => split,
            None if data.is_none() => return Ok(self.root.clone()),
            None => return Err(BackendError::other("cannot seed a file at the root")),
        };

        let mut nodes = self.write_nodes()?;
        let mut parent = self.root.clone();
        for segment in folders {
            parent = Self::ensure_folder(&mut nodes, &parent, segment)?;
        }

        match data {
            None => Self::ensure_folder(&mut nodes, &parent, leaf),
            Some(bytes) => {
                let existing = nodes.get(&parent).and_then(|n| n.children.get(*leaf)).cloned();
                if let Some(id) = existing {
                    let node = nodes
                        .get_mut(&id)
                        .ok_or_else(|| BackendError::not_found(id.to_string()))?;
                    if node.kind.is_folder() {
                        return Err(BackendError::is_a_directory(path));
                    }
                    node.data = Arc::from(bytes);
                    node.hash = hash;
                    node.modified = SystemTime::now();
                    return Ok(id);
                }
                let id = EntryId::generate();
                let mut node = Node::new(leaf, EntryKind::File);
                node.data = Arc::from(bytes);
                node.hash = hash;
                Self::attach(&mut nodes, &id, node, &parent)?;
                Ok(id)
            }
        }
    }

    fn ensure_folder(
        nodes: &mut HashMap<EntryId, Node>,
        parent: &EntryId,
        name: &str,
    ) -> BackendResult<EntryId> {
        let existing = nodes.get(parent).and_then(|n| n.children.get(name)).cloned();
        if let Some(id) = existing {
            return match nodes.get(&id) {
                Some(node) if node.kind.is_folder() => Ok(id),
                _ => Err(BackendError::not_a_directory(name)),
            };
        }
        let id = EntryId::generate();
        Self::attach(nodes, &id, Node::new(name, EntryKind::Folder), parent)?;
        Ok(id)
    }

    /// Insert a fresh node and link it under `parent`.
    fn attach(
        nodes: &mut HashMap<EntryId, Node>,
        id: &EntryId,
        mut node: Node,
        parent: &EntryId,
    ) -> BackendResult<()> {
        let parent_node = nodes
            .get_mut(parent)
            .ok_or_else(|| BackendError::not_found(parent.to_string()))?;
        if !parent_node.kind.is_folder() {
            return Err(BackendError::not_a_directory(parent.to_string()));
        }
        if parent_node.children.contains_key(&node.name) {
            return Err(BackendError::already_exists(node.name.clone()));
        }
        parent_node.children.insert(node.name.clone(), id.clone());
        node.parents.push(parent.clone());
        nodes.insert(id.clone(), node);
        Ok(())
    }

    fn unlink_any(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        let mut nodes = self.write_nodes()?;

        let linked = nodes
            .get(parent)
            .and_then(|p| p.children.get(name))
            .is_some_and(|id| id == entry);
        if !linked {
            return Err(BackendError::not_found(format!("{name} in {parent}")));
        }

        let node = nodes
            .get(entry)
            .ok_or_else(|| BackendError::not_found(entry.to_string()))?;
        let last_link = node.parents.len() <= 1;
        if last_link && !node.children.is_empty() {
            return Err(BackendError::directory_not_empty(name));
        }

        if let Some(p) = nodes.get_mut(parent) {
            p.children.shift_remove(name);
            p.modified = SystemTime::now();
        }
        if last_link {
            nodes.remove(entry);
        } else if let Some(node) = nodes.get_mut(entry) {
            if let Some(pos) = node.parents.iter().position(|p| p == parent) {
                node.parents.remove(pos);
            }
        }
        Ok(())
    }

    fn read_nodes(
        &self,
    ) -> BackendResult<std::sync::RwLockReadGuard<'_, HashMap<EntryId, Node>>> {
        self.nodes
            .read()
            .map_err(|_| BackendError::other("lock poisoned"))
    }

    fn write_nodes(
        &self,
    ) -> BackendResult<std::sync::RwLockWriteGuard<'_, HashMap<EntryId, Node>>> {
        self.nodes
            .write()
            .map_err(|_| BackendError::other("lock poisoned"))
    }

    fn file_slice(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Snapshot> {
        let nodes = self.read_nodes()?;
        match nodes.get(file) {
            Some(node) if node.kind.is_file() => {
                let size = node.data.len();
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(size);
                let len = usize::try_from(len).unwrap_or(usize::MAX);
                let end = start.saturating_add(len).min(size);
                Ok(Snapshot {
                    data: Arc::clone(&node.data),
                    range: start..end,
                })
            }
            Some(_) => Err(BackendError::is_a_directory(file.to_string())),
            None => Err(BackendError::not_found(file.to_string())),
        }
    }
}

impl Backend for MemoryBackend {
    fn label(&self) -> &str {
        "memory"
    }

    fn root(&self) -> BackendResult<Stat> {
        let nodes = self.read_nodes()?;
        nodes
            .get(&self.root)
            .map(|n| n.stat(&self.root))
            .ok_or_else(|| BackendError::not_found("root"))
    }

    fn list(&self, folder: &EntryId) -> BackendResult<Vec<Stat>> {
        let nodes = self.read_nodes()?;
        let node = nodes
            .get(folder)
            .ok_or_else(|| BackendError::not_found(folder.to_string()))?;
        if !node.kind.is_folder() {
            return Err(BackendError::not_a_directory(folder.to_string()));
        }
        Ok(node
            .children
            .values()
            .filter_map(|id| nodes.get(id).map(|child| child.stat(id)))
            .collect())
    }

    fn read(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Vec<u8>> {
        Ok(self.file_slice(file, offset, len)?.as_ref().to_vec())
    }

    fn open(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Box<dyn Read + Send>> {
        let snapshot = self.file_slice(file, offset, len)?;
        Ok(Box::new(io::Cursor::new(snapshot)))
    }

    fn create_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> BackendResult<Stat> {
        let mut nodes = self.write_nodes()?;
        let id = EntryId::generate();
        let mut node = Node::new(name, EntryKind::File);
        node.data = Arc::from(data);
        let stat = node.stat(&id);
        Self::attach(&mut nodes, &id, node, parent)?;
        Ok(stat)
    }

    fn create_folder(&self, parent: &EntryId, name: &str) -> BackendResult<Stat> {
        let mut nodes = self.write_nodes()?;
        let id = EntryId::generate();
        let node = Node::new(name, EntryKind::Folder);
        let stat = node.stat(&id);
        Self::attach(&mut nodes, &id, node, parent)?;
        Ok(stat)
    }

    fn link(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        let mut nodes = self.write_nodes()?;
        if !nodes.contains_key(entry) {
            return Err(BackendError::not_found(entry.to_string()));
        }
        let parent_node = nodes
            .get_mut(parent)
            .ok_or_else(|| BackendError::not_found(parent.to_string()))?;
        if !parent_node.kind.is_folder() {
            return Err(BackendError::not_a_directory(parent.to_string()));
        }
        if parent_node.children.contains_key(name) {
            return Err(BackendError::already_exists(name));
        }
        parent_node.children.insert(name.to_string(), entry.clone());
        if let Some(node) = nodes.get_mut(entry) {
            node.parents.push(parent.clone());
        }
        Ok(())
    }

    fn unlink(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        self.unlink_any(entry, parent, name)
    }

    fn rename(&self, entry: &EntryId, links: &[Link], new_name: &str) -> BackendResult<Stat> {
        let mut nodes = self.write_nodes()?;
        for (parent, old_name) in links {
            let parent_node = nodes
                .get(parent)
                .ok_or_else(|| BackendError::not_found(parent.to_string()))?;
            if parent_node.children.get(old_name) != Some(entry) {
                return Err(BackendError::not_found(format!("{old_name} in {parent}")));
            }
            if old_name != new_name && parent_node.children.contains_key(new_name) {
                return Err(BackendError::already_exists(new_name));
            }
        }
        for (parent, old_name) in links {
            if let Some(parent_node) = nodes.get_mut(parent) {
                if let Some(index) = parent_node.children.get_index_of(old_name.as_str()) {
                    parent_node.children.shift_remove(old_name.as_str());
                    parent_node
                        .children
                        .shift_insert(index, new_name.to_string(), entry.clone());
                }
            }
        }
        let node = nodes
            .get_mut(entry)
            .ok_or_else(|| BackendError::not_found(entry.to_string()))?;
        node.name = new_name.to_string();
        Ok(node.stat(entry))
    }

    fn relocate(
        &self,
        entry: &EntryId,
        links: &[Link],
        to: &EntryId,
        new_name: &str,
    ) -> BackendResult<Stat> {
        let mut nodes = self.write_nodes()?;
        match nodes.get(to) {
            Some(target) if target.kind.is_folder() => {
                if target.children.contains_key(new_name) {
                    return Err(BackendError::already_exists(new_name));
                }
            }
            Some(_) => return Err(BackendError::not_a_directory(to.to_string())),
            None => return Err(BackendError::not_found(to.to_string())),
        }
        for (parent, old_name) in links {
            if let Some(parent_node) = nodes.get_mut(parent) {
                if parent_node.children.get(old_name.as_str()) == Some(entry) {
                    parent_node.children.shift_remove(old_name.as_str());
                    parent_node.modified = SystemTime::now();
                }
            }
        }
        if let Some(target) = nodes.get_mut(to) {
            target.children.insert(new_name.to_string(), entry.clone());
            target.modified = SystemTime::now();
        }
        let node = nodes
            .get_mut(entry)
            .ok_or_else(|| BackendError::not_found(entry.to_string()))?;
        node.name = new_name.to_string();
        node.parents = vec![to.clone()];
        Ok(node.stat(entry))
    }

    fn set_times(
        &self,
        entry: &EntryId,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()> {
        let mut nodes = self.write_nodes()?;
        let node = nodes
            .get_mut(entry)
            .ok_or_else(|| BackendError::not_found(entry.to_string()))?;
        if let Some(created) = created {
            node.created = created;
        }
        if let Some(modified) = modified {
            node.modified = modified;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read() {
        let fs = MemoryBackend::new();
        let root = fs.root_id().clone();
        let stat = fs.create_file(&root, "test.txt", b"hello world").unwrap();
        assert_eq!(stat.size, 11);

        let data = fs.read(&stat.id, 0, 100).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_partial_read() {
        let fs = MemoryBackend::new();
        let id = fs.seed_file("test.txt", b"hello world").unwrap();

        assert_eq!(fs.read(&id, 6, 5).unwrap(), b"world");
        assert_eq!(fs.read(&id, 20, 5).unwrap(), b"");
    }

    #[test]
    fn test_open_reads_frozen_snapshot() {
        let fs = MemoryBackend::new();
        let id = fs.seed_file("data.bin", b"original").unwrap();
        let mut reader = fs.open(&id, 0, 8).unwrap();

        fs.seed_remove("data.bin").unwrap();
        assert!(!fs.contains(&id));

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "original");
    }

    #[test]
    fn test_seed_and_list_in_insertion_order() {
        let fs = MemoryBackend::new();
        fs.seed_file("docs/zeta.txt", b"z").unwrap();
        fs.seed_file("docs/alpha.txt", b"a").unwrap();
        fs.seed_folder("docs/work").unwrap();

        let docs = fs.resolve("docs").unwrap().unwrap();
        let names: Vec<_> = fs.list(&docs).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta.txt", "alpha.txt", "work"]);
    }

    #[test]
    fn test_seed_with_hash() {
        let fs = MemoryBackend::new();
        let id = fs
            .seed_file_with_hash("docs/report.txt", b"quarterly", "abc123")
            .unwrap();
        let docs = fs.resolve("docs").unwrap().unwrap();
        let listing = fs.list(&docs).unwrap();
        assert_eq!(listing[0].id, id);
        assert_eq!(listing[0].hash.as_known(), Some("abc123"));
    }

    #[test]
    fn test_hard_link_and_unlink() {
        let fs = MemoryBackend::new();
        let a = fs.seed_folder("a").unwrap();
        let b = fs.seed_folder("b").unwrap();
        let file = fs.seed_file("a/shared.txt", b"x").unwrap();
        fs.link(&file, &b, "shared.txt").unwrap();
        assert_eq!(fs.link_count(&file), 2);

        fs.unlink(&file, &a, "shared.txt").unwrap();
        assert!(fs.contains(&file));
        assert_eq!(fs.link_count(&file), 1);

        fs.unlink(&file, &b, "shared.txt").unwrap();
        assert!(!fs.contains(&file));
    }

    #[test]
    fn test_unlink_last_link_of_non_empty_folder_fails() {
        let fs = MemoryBackend::new();
        let dir = fs.seed_folder("nonempty").unwrap();
        fs.seed_file("nonempty/file.txt", b"data").unwrap();

        let result = fs.unlink(&dir, fs.root_id(), "nonempty");
        assert!(matches!(result, Err(BackendError::DirectoryNotEmpty(_))));
        assert!(fs.contains(&dir));
    }

    #[test]
    fn test_rename_keeps_position() {
        let fs = MemoryBackend::new();
        let root = fs.root_id().clone();
        fs.seed_file("first", b"1").unwrap();
        let mid = fs.seed_file("middle", b"2").unwrap();
        fs.seed_file("last", b"3").unwrap();

        let stat = fs.rename(&mid, &[(root.clone(), "middle".into())], "renamed").unwrap();
        assert_eq!(stat.name, "renamed");

        let names: Vec<_> = fs.list(&root).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["first", "renamed", "last"]);
    }

    #[test]
    fn test_rename_collision() {
        let fs = MemoryBackend::new();
        let root = fs.root_id().clone();
        let a = fs.seed_file("a", b"").unwrap();
        fs.seed_file("b", b"").unwrap();

        let result = fs.rename(&a, &[(root, "a".into())], "b");
        assert!(matches!(result, Err(BackendError::AlreadyExists(_))));
    }

    #[test]
    fn test_relocate() {
        let fs = MemoryBackend::new();
        let root = fs.root_id().clone();
        let dest = fs.seed_folder("dest").unwrap();
        let file = fs.seed_file("old.txt", b"content").unwrap();

        let stat = fs.relocate(&file, &[(root, "old.txt".into())], &dest, "new.txt").unwrap();
        assert_eq!(stat.id, file);
        assert_eq!(stat.name, "new.txt");
        assert_eq!(fs.resolve("dest/new.txt").unwrap(), Some(file));
        assert_eq!(fs.resolve("old.txt").unwrap(), None);
    }

    #[test]
    fn test_set_times() {
        let fs = MemoryBackend::new();
        let id = fs.seed_file("t.txt", b"").unwrap();
        let epoch = SystemTime::UNIX_EPOCH;
        fs.set_times(&id, Some(epoch), None).unwrap();

        let root = fs.root_id().clone();
        let stat = fs.list(&root).unwrap().remove(0);
        assert_eq!(stat.created, epoch);
        assert_ne!(stat.modified, epoch);
    }
}
