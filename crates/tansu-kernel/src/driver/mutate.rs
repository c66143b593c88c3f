//! Structural changes: create, link, unlink, move, rename, delete.
//!
//! Every public entry point takes the mutation lock, queues lifecycle
//! events while it works and fires them after releasing the lock.

use std::time::SystemTime;

use tansu_types::{EntryId, EntryKind, LoadState, NameError, Stat, split_path, validate_name};

use super::graph::Graph;
use super::{Driver, Event};
use crate::backend::Link;
use crate::entry::{Entry, EntryHandle};
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::folder::Folder;

/// Keep what the driver learned about an entry across a backend restat:
/// a cached hash and factory-added properties.
fn carry_over(old: &Stat, mut new: Stat) -> Stat {
    if !new.hash.is_known() {
        new.hash = old.hash.clone();
    }
    for (key, value) in &old.properties {
        new.properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    new
}

/// Every link of `entry` as (parent, name there). A parent that doesn't
/// list the entry is a stale link.
fn links_of(graph: &Graph, entry: &EntryId) -> FsResult<Vec<Link>> {
    graph
        .node(entry)?
        .parents
        .iter()
        .map(|parent| {
            graph
                .name_in(parent, entry)
                .map(|name| (parent.clone(), name))
                .ok_or_else(|| {
                    FsError::not_found(format!("stale link from {parent} to {entry}"))
                })
        })
        .collect()
}

impl Driver {
    fn validate(&self, name: &str) -> FsResult<()> {
        validate_name(name, self.inner.config.max_name_len)?;
        Ok(())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a file under `parent`.
    pub fn create_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> FsResult<File> {
        self.validate(name)?;
        let guard = self.inner.mutations.lock();
        self.check_open(parent)?;
        let mut events = self.scan_locked(parent, false)?;

        let result = self.create_locked(parent, name, EntryKind::File, data);
        drop(guard);
        if let Ok(id) = &result {
            events.push(Event::FileLoaded(id.clone()));
        }
        self.fire(events);

        let id = result?;
        tracing::debug!(parent = %parent, entry = %id, name, size = data.len(), "created file");
        Ok(File::new(id, self.clone()))
    }

    /// Create an empty folder under `parent`.
    ///
    /// `name` is a single segment; see [`create_folder_all`](Self::create_folder_all)
    /// for nested paths.
    pub fn create_folder(&self, parent: &EntryId, name: &str) -> FsResult<Folder> {
        self.validate(name)?;
        let guard = self.inner.mutations.lock();
        self.check_open(parent)?;
        let mut events = self.scan_locked(parent, false)?;

        let result = self.create_locked(parent, name, EntryKind::Folder, &[]);
        drop(guard);
        if let Ok(id) = &result {
            // Known empty: skips Scanning but still announces both steps.
            events.push(Event::FolderLoaded(id.clone()));
            events.push(Event::FolderScanned(id.clone()));
        }
        self.fire(events);

        let id = result?;
        tracing::debug!(parent = %parent, entry = %id, name, "created folder");
        Ok(Folder::new(id, self.clone()))
    }

    /// Create every missing folder along `path` below `parent`.
    ///
    /// Existing folders are reused. A file in the way is a `NameConflict`.
    pub fn create_folder_all(&self, parent: &EntryId, path: &str) -> FsResult<Folder> {
        let segments = split_path(path);
        if segments.is_empty() {
            return Err(NameError::Empty.into());
        }
        for segment in &segments {
            self.validate(segment)?;
        }

        let _guard = self.inner.mutations.lock();
        let mut current = parent.clone();
        for segment in segments {
            current = match self.child_of(&current, segment)? {
                Some((id, EntryKind::Folder)) => id,
                Some((_, EntryKind::File)) => {
                    return Err(FsError::name_conflict(&current, segment));
                }
                None => self.create_folder(&current, segment)?.id().clone(),
            };
        }
        Ok(Folder::new(current, self.clone()))
    }

    /// Backend create plus indexing. Caller holds the lock and has scanned
    /// `parent`.
    fn create_locked(
        &self,
        parent: &EntryId,
        name: &str,
        kind: EntryKind,
        data: &[u8],
    ) -> FsResult<EntryId> {
        if self.inner.graph.read().child(parent, name).is_some() {
            return Err(FsError::name_conflict(parent, name));
        }

        let stat = match kind {
            EntryKind::File => self.inner.backend.create_file(parent, name, data)?,
            EntryKind::Folder => self.inner.backend.create_folder(parent, name)?,
        };
        let stat = self.materialize(stat, Some(parent));
        let id = stat.id.clone();
        let state = match kind {
            EntryKind::File => LoadState::Loaded,
            EntryKind::Folder => LoadState::Scanned,
        };

        let mut graph = self.inner.graph.write();
        graph.insert(stat, state);
        if let Err(e) = graph.link(parent, &id, name) {
            graph.purge(&id);
            return Err(e);
        }
        Ok(id)
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Link an existing entry into another folder under its current name.
    ///
    /// The entry gains a parent; existing parents are kept. Linking into a
    /// folder that already holds the entry is a no-op.
    pub fn link(&self, entry: &EntryId, folder: &EntryId) -> FsResult<()> {
        let guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        let mut events = Vec::new();
        let result = self.link_locked(entry, folder, &mut events);
        drop(guard);
        self.fire(events);
        result
    }

    fn link_locked(
        &self,
        entry: &EntryId,
        folder: &EntryId,
        events: &mut Vec<Event>,
    ) -> FsResult<()> {
        events.extend(self.scan_locked(folder, false)?);

        let name = {
            let graph = self.inner.graph.read();
            if graph.is_root(entry) {
                return Err(FsError::invalid_target("the root cannot be linked"));
            }
            let name = graph.node(entry)?.stat.name.clone();
            match graph.child(folder, &name) {
                Some(existing) if existing == entry => return Ok(()),
                Some(_) => return Err(FsError::name_conflict(folder, name)),
                None => {}
            }
            if entry == folder || graph.is_ancestor(entry, folder) {
                return Err(FsError::invalid_target(format!(
                    "linking {entry} into {folder} would create a cycle"
                )));
            }
            name
        };

        self.inner.backend.link(entry, folder, &name)?;
        self.inner.graph.write().link(folder, entry, &name)?;
        tracing::debug!(entry = %entry, folder = %folder, name = %name, "linked entry");
        Ok(())
    }

    /// Remove `entry` from `folder` only.
    ///
    /// Returns false if it wasn't linked there. Removing the last link is a
    /// non-recursive delete, so a populated folder fails with `NotEmpty`.
    pub fn unlink(&self, entry: &EntryId, folder: &EntryId) -> FsResult<bool> {
        let guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        let mut events = Vec::new();
        let result = self.unlink_locked(entry, folder, false, &mut events);
        drop(guard);
        self.fire(events);
        result
    }

    /// Unlink from one folder, deleting once no parents would remain.
    fn unlink_locked(
        &self,
        entry: &EntryId,
        folder: &EntryId,
        recursive: bool,
        events: &mut Vec<Event>,
    ) -> FsResult<bool> {
        let (name, parent_count) = {
            let graph = self.inner.graph.read();
            let Some(node) = graph.get(entry) else {
                return Ok(false);
            };
            let Some(name) = graph.name_in(folder, entry) else {
                return Ok(false);
            };
            (name, node.parents.len())
        };

        if parent_count <= 1 {
            return self.delete_locked(entry, recursive, events);
        }

        self.inner.backend.unlink(entry, folder, &name)?;
        self.inner.graph.write().unlink(folder, entry);
        tracing::debug!(entry = %entry, folder = %folder, remaining = parent_count - 1, "unlinked entry");
        Ok(true)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Remove an entry from all its parents and purge it from the index.
    ///
    /// Returns false if the entry was already gone. A populated folder needs
    /// `recursive`; then children are removed depth-first and any that fail
    /// are reported in `FsError::PartialDelete`, with the folder kept.
    pub fn delete_entry(&self, entry: &EntryId, recursive: bool) -> FsResult<bool> {
        let guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        let mut events = Vec::new();
        let result = self.delete_locked(entry, recursive, &mut events);
        drop(guard);
        self.fire(events);
        result
    }

    fn delete_locked(
        &self,
        entry: &EntryId,
        recursive: bool,
        events: &mut Vec<Event>,
    ) -> FsResult<bool> {
        let is_folder = {
            let graph = self.inner.graph.read();
            let Some(node) = graph.get(entry) else {
                return Ok(false);
            };
            if graph.is_root(entry) {
                return Err(FsError::invalid_target("the root cannot be deleted"));
            }
            node.stat.is_folder()
        };

        if is_folder {
            events.extend(self.scan_locked(entry, false)?);
            let children = self.inner.graph.read().children(entry);
            if !children.is_empty() {
                if !recursive {
                    return Err(FsError::NotEmpty(entry.clone()));
                }
                let mut failed = Vec::new();
                for child in children {
                    // Children linked elsewhere too only lose this link.
                    if let Err(e) = self.unlink_locked(&child, entry, true, events) {
                        failed.push((child, e));
                    }
                }
                if !failed.is_empty() {
                    tracing::warn!(folder = %entry, failed = failed.len(), "partial delete");
                    return Err(FsError::PartialDelete {
                        folder: entry.clone(),
                        failed,
                    });
                }
            }
        }

        let parents = self.inner.graph.read().node(entry)?.parents.clone();
        for parent in &parents {
            let name = self.inner.graph.read().name_in(parent, entry);
            let Some(name) = name else {
                continue;
            };
            // One link at a time: a failure leaves the graph matching the
            // backend.
            self.inner.backend.unlink(entry, parent, &name)?;
            self.inner.graph.write().unlink(parent, entry);
        }

        let purged = self.inner.graph.write().purge(entry);
        tracing::debug!(entry = %entry, purged = purged.len(), "deleted entry");
        Ok(true)
    }

    // ========================================================================
    // Move and rename
    // ========================================================================

    /// Move an entry under `new_parent`, replacing its whole parent set.
    ///
    /// `new_name` defaults to the current name. An existing entry with that
    /// name is deleted first when `overwrite` is set. Returns the entry's
    /// handle afterwards, which carries a new id if the backend couldn't
    /// move in place.
    pub fn move_entry(
        &self,
        entry: &EntryId,
        new_parent: &EntryId,
        new_name: Option<&str>,
        overwrite: bool,
    ) -> FsResult<Entry> {
        if let Some(name) = new_name {
            self.validate(name)?;
        }
        let guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        let mut events = Vec::new();
        let result = self.move_locked(entry, new_parent, new_name, overwrite, &mut events);
        drop(guard);
        self.fire(events);
        result
    }

    fn move_locked(
        &self,
        entry: &EntryId,
        new_parent: &EntryId,
        new_name: Option<&str>,
        overwrite: bool,
        events: &mut Vec<Event>,
    ) -> FsResult<Entry> {
        events.extend(self.scan_locked(new_parent, false)?);

        let (old_name, links, kind) = {
            let graph = self.inner.graph.read();
            if graph.is_root(entry) {
                return Err(FsError::invalid_target("the root cannot be moved"));
            }
            let node = graph.node(entry)?;
            if entry == new_parent || graph.is_ancestor(entry, new_parent) {
                return Err(FsError::invalid_target(format!(
                    "cannot move {entry} into its own descendant {new_parent}"
                )));
            }
            if node.parents.is_empty() {
                return Err(FsError::not_found(format!("{entry} has no parent")));
            }
            (node.stat.name.clone(), links_of(&graph, entry)?, node.stat.kind)
        };
        let parents: Vec<EntryId> = links.iter().map(|(p, _)| p.clone()).collect();
        let name = new_name.unwrap_or(&old_name).to_string();

        let existing = self.inner.graph.read().child(new_parent, &name).cloned();
        match existing {
            Some(existing) if existing == *entry => {
                // Already there under that name: only the other links go.
                for parent in parents.iter().filter(|p| *p != new_parent) {
                    self.unlink_locked(entry, parent, false, events)?;
                }
                return Ok(Entry::from_kind(kind, entry.clone(), self.clone()));
            }
            Some(existing) => {
                if !overwrite {
                    return Err(FsError::name_conflict(new_parent, name));
                }
                if self.inner.graph.read().is_ancestor(&existing, entry) {
                    return Err(FsError::invalid_target(format!(
                        "overwriting {existing} would delete {entry}"
                    )));
                }
                self.delete_locked(&existing, true, events)?;
            }
            None => {}
        }

        let stat = self
            .inner
            .backend
            .relocate(entry, &links, new_parent, &name)?;
        let new_id = stat.id.clone();
        {
            let mut graph = self.inner.graph.write();
            for parent in &parents {
                graph.unlink(parent, entry);
            }
            let merged = carry_over(&graph.node(entry)?.stat, stat);
            graph.restat(entry, merged)?;
            graph.link(new_parent, &new_id, &name)?;
        }

        tracing::debug!(
            entry = %entry,
            new_id = %new_id,
            to = %new_parent,
            name = %name,
            "moved entry"
        );
        Ok(Entry::from_kind(kind, new_id, self.clone()))
    }

    /// Rename an entry under every parent it has.
    ///
    /// Siblings using `new_name` under any parent are a `NameConflict`
    /// unless `overwrite` is set, in which case they are deleted first.
    pub fn rename_entry(&self, entry: &EntryId, new_name: &str, overwrite: bool) -> FsResult<Entry> {
        self.validate(new_name)?;
        let guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        let mut events = Vec::new();
        let result = self.rename_locked(entry, new_name, overwrite, &mut events);
        drop(guard);
        self.fire(events);
        result
    }

    fn rename_locked(
        &self,
        entry: &EntryId,
        new_name: &str,
        overwrite: bool,
        events: &mut Vec<Event>,
    ) -> FsResult<Entry> {
        let (old_name, links, kind) = {
            let graph = self.inner.graph.read();
            if graph.is_root(entry) {
                return Err(FsError::invalid_target("the root cannot be renamed"));
            }
            let node = graph.node(entry)?;
            (node.stat.name.clone(), links_of(&graph, entry)?, node.stat.kind)
        };
        if old_name == new_name && links.iter().all(|(_, link)| link == new_name) {
            return Ok(Entry::from_kind(kind, entry.clone(), self.clone()));
        }
        let parents: Vec<EntryId> = links.iter().map(|(p, _)| p.clone()).collect();

        let mut doomed = Vec::new();
        for parent in &parents {
            events.extend(self.scan_locked(parent, false)?);
            let existing = self.inner.graph.read().child(parent, new_name).cloned();
            if let Some(existing) = existing {
                if existing == *entry {
                    continue;
                }
                if !overwrite {
                    return Err(FsError::name_conflict(parent, new_name));
                }
                doomed.push(existing);
            }
        }
        for existing in doomed {
            if self.inner.graph.read().is_ancestor(&existing, entry) {
                return Err(FsError::invalid_target(format!(
                    "overwriting {existing} would delete {entry}"
                )));
            }
            self.delete_locked(&existing, true, events)?;
        }

        let stat = self
            .inner
            .backend
            .rename(entry, &links, new_name)?;
        let new_id = stat.id.clone();
        {
            let mut graph = self.inner.graph.write();
            for (parent, link_name) in &links {
                graph.rename_child(parent, link_name, new_name);
            }
            let merged = carry_over(&graph.node(entry)?.stat, stat);
            graph.restat(entry, merged)?;
        }

        tracing::debug!(entry = %entry, from = %old_name, to = %new_name, "renamed entry");
        Ok(Entry::from_kind(kind, new_id, self.clone()))
    }

    // ========================================================================
    // Timestamps
    // ========================================================================

    /// Set an entry's creation time.
    pub fn set_created_time(&self, entry: &EntryId, time: SystemTime) -> FsResult<()> {
        self.set_times(entry, Some(time), None)
    }

    /// Set an entry's modification time.
    pub fn set_modified_time(&self, entry: &EntryId, time: SystemTime) -> FsResult<()> {
        self.set_times(entry, None, Some(time))
    }

    fn set_times(
        &self,
        entry: &EntryId,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        let _guard = self.inner.mutations.lock();
        self.check_open(entry)?;
        self.inner.graph.read().node(entry)?;

        self.inner.backend.set_times(entry, created, modified)?;

        let mut graph = self.inner.graph.write();
        let node = graph.node_mut(entry)?;
        if let Some(created) = created {
            node.stat.created = created;
        }
        if let Some(modified) = modified {
            node.stat.modified = modified;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_over_keeps_cached_hash_and_properties() {
        let old = Stat::file(EntryId::new("a"), "a.txt", 3)
            .with_hash("abc")
            .with_property("tag", serde_json::json!("draft"));
        let new = Stat::file(EntryId::new("a"), "b.txt", 3)
            .with_property("mode", serde_json::json!(420));

        let merged = carry_over(&old, new);
        assert_eq!(merged.name, "b.txt");
        assert_eq!(merged.hash.as_known(), Some("abc"));
        assert_eq!(merged.properties.len(), 2);
    }

    #[test]
    fn test_carry_over_prefers_backend_hash() {
        let old = Stat::file(EntryId::new("a"), "a.txt", 3).with_hash("old");
        let new = Stat::file(EntryId::new("a"), "a.txt", 3).with_hash("new");
        assert_eq!(carry_over(&old, new).hash.as_known(), Some("new"));
    }
}
