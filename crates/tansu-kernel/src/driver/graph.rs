//! Canonical entry graph.
//!
//! Entries are nodes keyed by id. Parent links are kept as an ordered list
//! on the child (first-linked parent first) and child links as an ordered
//! name map on the folder. The two sides are only ever changed together.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use tansu_types::{EntryId, LoadState, Stat};

use crate::error::{FsError, FsResult};

/// One indexed entry.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) stat: Stat,
    /// Link order. The first parent defines the canonical path.
    pub(crate) parents: Vec<EntryId>,
    /// Folder children in insertion order. Always empty for files.
    pub(crate) children: IndexMap<String, EntryId>,
    pub(crate) state: LoadState,
}

impl Node {
    fn new(stat: Stat, state: LoadState) -> Self {
        Self {
            stat,
            parents: Vec::new(),
            children: IndexMap::new(),
            state,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: HashMap<EntryId, Node>,
    root: Option<EntryId>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn root(&self) -> Option<&EntryId> {
        self.root.as_ref()
    }

    pub(crate) fn is_root(&self, id: &EntryId) -> bool {
        self.root.as_ref() == Some(id)
    }

    pub(crate) fn set_root(&mut self, stat: Stat) {
        let id = stat.id.clone();
        self.nodes.insert(id.clone(), Node::new(stat, LoadState::Loaded));
        self.root = Some(id);
    }

    pub(crate) fn contains(&self, id: &EntryId) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn get(&self, id: &EntryId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &EntryId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// The node, or `Gone` if it left the index.
    pub(crate) fn node(&self, id: &EntryId) -> FsResult<&Node> {
        self.nodes.get(id).ok_or_else(|| FsError::gone(id))
    }

    pub(crate) fn node_mut(&mut self, id: &EntryId) -> FsResult<&mut Node> {
        self.nodes.get_mut(id).ok_or_else(|| FsError::gone(id))
    }

    /// The node, which must be a folder.
    pub(crate) fn folder(&self, id: &EntryId) -> FsResult<&Node> {
        let node = self.node(id)?;
        if !node.stat.is_folder() {
            return Err(FsError::invalid_target(format!("{id} is not a folder")));
        }
        Ok(node)
    }

    /// Index an entry without linking it anywhere.
    pub(crate) fn insert(&mut self, stat: Stat, state: LoadState) {
        self.nodes
            .insert(stat.id.clone(), Node::new(stat, state));
    }

    pub(crate) fn child(&self, folder: &EntryId, name: &str) -> Option<&EntryId> {
        self.nodes.get(folder).and_then(|n| n.children.get(name))
    }

    /// Name under which `child` is linked in `folder`.
    pub(crate) fn name_in(&self, folder: &EntryId, child: &EntryId) -> Option<String> {
        self.nodes.get(folder).and_then(|n| {
            n.children
                .iter()
                .find(|(_, id)| *id == child)
                .map(|(name, _)| name.clone())
        })
    }

    pub(crate) fn children(&self, folder: &EntryId) -> Vec<EntryId> {
        self.nodes
            .get(folder)
            .map(|n| n.children.values().cloned().collect())
            .unwrap_or_default()
    }

    /// True if `ancestor` is reachable from `id` by following parent links.
    pub(crate) fn is_ancestor(&self, ancestor: &EntryId, id: &EntryId) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&EntryId> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for parent in &node.parents {
                if parent == ancestor {
                    return true;
                }
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    /// Link `child` into `folder` as `name`.
    ///
    /// Rejects name collisions and links that would make an entry its own
    /// ancestor. Linking the same entry under the same name again is a no-op.
    pub(crate) fn link(&mut self, folder: &EntryId, child: &EntryId, name: &str) -> FsResult<()> {
        self.folder(folder)?;
        if !self.contains(child) {
            return Err(FsError::gone(child));
        }
        match self.child(folder, name) {
            Some(existing) if existing == child => return Ok(()),
            Some(_) => return Err(FsError::name_conflict(folder, name)),
            None => {}
        }
        if folder == child || self.is_ancestor(child, folder) {
            return Err(FsError::invalid_target(format!(
                "linking {child} into {folder} would create a cycle"
            )));
        }

        if let Some(node) = self.nodes.get_mut(folder) {
            node.children.insert(name.to_string(), child.clone());
        }
        if let Some(node) = self.nodes.get_mut(child) {
            if !node.parents.contains(folder) {
                node.parents.push(folder.clone());
            }
        }
        Ok(())
    }

    /// Remove the link from `folder` to `child`. Returns the name it had.
    pub(crate) fn unlink(&mut self, folder: &EntryId, child: &EntryId) -> Option<String> {
        let name = self.name_in(folder, child)?;
        if let Some(node) = self.nodes.get_mut(folder) {
            node.children.shift_remove(&name);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parents.retain(|p| p != folder);
        }
        Some(name)
    }

    /// Rename the link `old` in `folder`, keeping its position.
    pub(crate) fn rename_child(&mut self, folder: &EntryId, old: &str, new: &str) {
        if let Some(node) = self.nodes.get_mut(folder) {
            if let Some((index, _, id)) = node.children.shift_remove_full(old) {
                node.children.shift_insert(index, new.to_string(), id);
            }
        }
    }

    /// Replace an entry's stat, moving the node if the backend changed its id.
    pub(crate) fn restat(&mut self, id: &EntryId, stat: Stat) -> FsResult<()> {
        if stat.id == *id {
            self.node_mut(id)?.stat = stat;
            return Ok(());
        }

        let mut node = self.nodes.remove(id).ok_or_else(|| FsError::gone(id))?;
        let new_id = stat.id.clone();
        node.stat = stat;

        for parent in &node.parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                for value in p.children.values_mut() {
                    if value == id {
                        *value = new_id.clone();
                    }
                }
            }
        }
        for child in node.children.values() {
            if let Some(c) = self.nodes.get_mut(child) {
                for parent in c.parents.iter_mut() {
                    if parent == id {
                        *parent = new_id.clone();
                    }
                }
            }
        }
        if self.root.as_ref() == Some(id) {
            self.root = Some(new_id.clone());
        }
        self.nodes.insert(new_id, node);
        Ok(())
    }

    /// Drop an entry and every descendant left without parents.
    ///
    /// Detaches the entry from any parents it still has. Returns the ids
    /// that left the index.
    pub(crate) fn purge(&mut self, id: &EntryId) -> Vec<EntryId> {
        let mut purged = Vec::new();
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(&current) else {
                continue;
            };
            for parent in &node.parents {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|_, c| *c != current);
                }
            }
            for child in node.children.values() {
                if let Some(c) = self.nodes.get_mut(child) {
                    c.parents.retain(|p| *p != current);
                    if c.parents.is_empty() {
                        stack.push(child.clone());
                    }
                }
            }
            purged.push(current);
        }
        purged
    }

    /// Canonical `/`-joined path, following first parents up to the root.
    pub(crate) fn path(&self, id: &EntryId) -> FsResult<String> {
        let mut names = Vec::new();
        let mut current = id;
        // A well-formed graph reaches the root in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            let node = self.node(current)?;
            match node.parents.first() {
                Some(parent) => {
                    names.push(node.stat.name.as_str());
                    current = parent;
                }
                None if self.is_root(current) => {
                    names.reverse();
                    return Ok(format!("/{}", names.join("/")));
                }
                None => {
                    return Err(FsError::not_found(format!("{id} is detached from the root")));
                }
            }
        }
        Err(FsError::not_found(format!("{id} has no path to the root")))
    }

    /// Distinct files below `folder`, in depth-first child order.
    pub(crate) fn descendant_files(&self, folder: &EntryId) -> Vec<EntryId> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();
        self.collect_files(folder, &mut seen, &mut files);
        files
    }

    fn collect_files(
        &self,
        folder: &EntryId,
        seen: &mut HashSet<EntryId>,
        files: &mut Vec<EntryId>,
    ) {
        let Some(node) = self.nodes.get(folder) else {
            return;
        };
        for child in node.children.values() {
            if !seen.insert(child.clone()) {
                continue;
            }
            match self.nodes.get(child) {
                Some(c) if c.stat.is_file() => files.push(child.clone()),
                Some(_) => self.collect_files(child, seen, files),
                None => {}
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn id(s: &str) -> EntryId {
        EntryId::new(s)
    }

    /// root ─┬─ docs ── work
    ///       └─ a.txt
    fn sample() -> Graph {
        let mut g = Graph::new();
        g.set_root(Stat::folder(id("root"), ""));
        g.insert(Stat::folder(id("docs"), "docs"), LoadState::Loaded);
        g.insert(Stat::folder(id("work"), "work"), LoadState::Loaded);
        g.insert(Stat::file(id("a"), "a.txt", 3), LoadState::Loaded);
        g.link(&id("root"), &id("docs"), "docs").unwrap();
        g.link(&id("docs"), &id("work"), "work").unwrap();
        g.link(&id("root"), &id("a"), "a.txt").unwrap();
        g
    }

    #[test]
    fn test_paths() {
        let g = sample();
        assert_eq!(g.path(&id("root")).unwrap(), "/");
        assert_eq!(g.path(&id("work")).unwrap(), "/docs/work");
        assert_eq!(g.path(&id("a")).unwrap(), "/a.txt");
    }

    #[test]
    fn test_link_conflict_and_idempotence() {
        let mut g = sample();
        g.link(&id("root"), &id("a"), "a.txt").unwrap();
        let err = g.link(&id("root"), &id("work"), "a.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConflict);
    }

    #[test]
    fn test_link_rejects_cycle() {
        let mut g = sample();
        let err = g.link(&id("work"), &id("docs"), "docs").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
        let err = g.link(&id("docs"), &id("docs"), "self").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_multi_parent_path_uses_first_link() {
        let mut g = sample();
        g.link(&id("work"), &id("a"), "a.txt").unwrap();
        assert_eq!(g.get(&id("a")).unwrap().parents, vec![id("root"), id("work")]);
        assert_eq!(g.path(&id("a")).unwrap(), "/a.txt");

        g.unlink(&id("root"), &id("a"));
        assert_eq!(g.path(&id("a")).unwrap(), "/docs/work/a.txt");
    }

    #[test]
    fn test_is_ancestor_through_any_parent() {
        let mut g = sample();
        g.insert(Stat::folder(id("other"), "other"), LoadState::Loaded);
        g.link(&id("root"), &id("other"), "other").unwrap();
        g.link(&id("other"), &id("work"), "work").unwrap();

        assert!(g.is_ancestor(&id("docs"), &id("work")));
        assert!(g.is_ancestor(&id("other"), &id("work")));
        assert!(!g.is_ancestor(&id("work"), &id("docs")));
    }

    #[test]
    fn test_rename_child_keeps_position() {
        let mut g = sample();
        g.rename_child(&id("root"), "docs", "papers");
        let names: Vec<_> = g.get(&id("root")).unwrap().children.keys().cloned().collect();
        assert_eq!(names, vec!["papers", "a.txt"]);
    }

    #[test]
    fn test_restat_rekeys_links() {
        let mut g = sample();
        g.restat(&id("docs"), Stat::folder(id("docs-2"), "docs")).unwrap();
        assert!(!g.contains(&id("docs")));
        assert_eq!(g.child(&id("root"), "docs"), Some(&id("docs-2")));
        assert_eq!(g.get(&id("work")).unwrap().parents, vec![id("docs-2")]);
        assert_eq!(g.path(&id("work")).unwrap(), "/docs/work");
    }

    #[test]
    fn test_purge_drops_orphans_only() {
        let mut g = sample();
        g.insert(Stat::file(id("b"), "b.txt", 1), LoadState::Loaded);
        g.link(&id("work"), &id("b"), "b.txt").unwrap();
        g.link(&id("root"), &id("b"), "b.txt").unwrap();

        let purged = g.purge(&id("docs"));
        assert_eq!(purged.len(), 2);
        assert!(!g.contains(&id("work")));
        assert!(g.contains(&id("b")));
        assert_eq!(g.get(&id("b")).unwrap().parents, vec![id("root")]);
        assert!(g.child(&id("root"), "docs").is_none());
    }

    #[test]
    fn test_descendant_files_distinct() {
        let mut g = sample();
        g.link(&id("work"), &id("a"), "a.txt").unwrap();
        assert_eq!(g.descendant_files(&id("root")), vec![id("a")]);
        assert_eq!(g.descendant_files(&id("docs")), vec![id("a")]);
    }
}
