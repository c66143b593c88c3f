//! Folder enumeration: Loaded → Scanning → Scanned.

use std::collections::HashSet;

use tansu_types::{EntryId, LoadState, Stat};

use super::{Driver, Event};
use crate::error::{FsError, FsResult};

impl Driver {
    /// Enumerate a folder's children unless that already happened.
    pub(crate) fn ensure_scanned(&self, folder: &EntryId) -> FsResult<()> {
        self.check_open(folder)?;
        if self.inner.graph.read().folder(folder)?.state == LoadState::Scanned {
            return Ok(());
        }

        let guard = self.inner.mutations.lock();
        let events = self.scan_locked(folder, false)?;
        drop(guard);
        self.fire(events);
        Ok(())
    }

    /// Re-enumerate a folder.
    ///
    /// Picks up children the backend gained, drops links to children it
    /// lost (purging entries left without parents) and refreshes the stats
    /// of the rest. Fires loaded hooks for new entries, then the scanned hook.
    pub fn refresh(&self, folder: &EntryId) -> FsResult<()> {
        self.check_open(folder)?;
        let guard = self.inner.mutations.lock();
        let events = self.scan_locked(folder, true)?;
        drop(guard);
        self.fire(events);
        Ok(())
    }

    /// Scan with the mutation lock held. Returns the notifications to fire.
    pub(super) fn scan_locked(&self, folder: &EntryId, rescan: bool) -> FsResult<Vec<Event>> {
        let previous = self.inner.graph.read().folder(folder)?.state;
        match previous {
            LoadState::Scanning => {
                return Err(FsError::conflict(format!("folder {folder} is being scanned")));
            }
            LoadState::Scanned if !rescan => return Ok(Vec::new()),
            _ => {}
        }
        self.inner.graph.write().node_mut(folder)?.state = LoadState::Scanning;

        let result = self
            .inner
            .backend
            .list(folder)
            .map_err(FsError::from)
            .and_then(|listing| self.absorb(folder, listing, rescan));

        {
            let mut graph = self.inner.graph.write();
            if let Some(node) = graph.get_mut(folder) {
                node.state = if result.is_ok() {
                    LoadState::Scanned
                } else {
                    previous
                };
            }
        }

        let mut events = result?;
        tracing::debug!(
            folder = %folder,
            loaded = events.len(),
            rescan,
            "scanned folder"
        );
        events.push(Event::FolderScanned(folder.clone()));
        Ok(events)
    }

    /// Index and link a backend listing under `folder`.
    fn absorb(&self, folder: &EntryId, listing: Vec<Stat>, rescan: bool) -> FsResult<Vec<Event>> {
        let mut names = HashSet::new();
        let listing: Vec<Stat> = listing
            .into_iter()
            .filter(|stat| {
                let fresh = names.insert(stat.name.clone());
                if !fresh {
                    tracing::warn!(
                        folder = %folder,
                        name = %stat.name,
                        "backend listed a duplicate name, keeping the first"
                    );
                }
                fresh
            })
            .collect();

        if rescan {
            self.drop_vanished(folder, &listing)?;
        }

        let mut events = Vec::new();
        for stat in listing {
            let known = self.inner.graph.read().contains(&stat.id);
            if known {
                self.relink_known(folder, stat);
                continue;
            }

            let name = stat.name.clone();
            let id = stat.id.clone();
            let is_file = stat.is_file();
            let built = self.materialize(stat, Some(folder));

            let mut graph = self.inner.graph.write();
            graph.insert(built, LoadState::Loaded);
            if let Err(e) = graph.link(folder, &id, &name) {
                tracing::warn!(folder = %folder, entry = %id, error = %e, "skipping unlinkable child");
                graph.purge(&id);
                continue;
            }
            events.push(if is_file {
                Event::FileLoaded(id)
            } else {
                Event::FolderLoaded(id)
            });
        }
        Ok(events)
    }

    /// Update an already-indexed entry seen in a listing and make sure it is
    /// linked here. A hard link found by scanning lands here too.
    fn relink_known(&self, folder: &EntryId, stat: Stat) {
        let mut graph = self.inner.graph.write();
        let id = stat.id.clone();
        let link_name = stat.name.clone();
        if let Some(node) = graph.get_mut(&id) {
            // A hash cached by the driver holds only while size and mtime do.
            let unchanged =
                stat.size == node.stat.size && stat.modified == node.stat.modified;
            let hash = if stat.hash.is_known() || !unchanged {
                stat.hash.clone()
            } else {
                node.stat.hash.clone()
            };
            // Names are entry-level; an extra link doesn't rename the entry.
            let name = if node.parents.is_empty() {
                stat.name.clone()
            } else {
                node.stat.name.clone()
            };
            node.stat = Stat { name, hash, ..stat };
        }
        if let Err(e) = graph.link(folder, &id, &link_name) {
            tracing::warn!(folder = %folder, entry = %id, error = %e, "skipping unlinkable child");
        }
    }

    /// Unlink children the backend no longer lists under `folder`.
    fn drop_vanished(&self, folder: &EntryId, listing: &[Stat]) -> FsResult<()> {
        let keep: HashSet<(&str, &EntryId)> = listing
            .iter()
            .map(|s| (s.name.as_str(), &s.id))
            .collect();

        let mut graph = self.inner.graph.write();
        let stale: Vec<EntryId> = graph
            .folder(folder)?
            .children
            .iter()
            .filter(|(name, id)| !keep.contains(&(name.as_str(), *id)))
            .map(|(_, id)| id.clone())
            .collect();

        for id in stale {
            graph.unlink(folder, &id);
            let orphaned = graph.get(&id).is_some_and(|n| n.parents.is_empty());
            if orphaned {
                let purged = graph.purge(&id);
                tracing::debug!(folder = %folder, entry = %id, purged = purged.len(), "entry vanished");
            }
        }
        Ok(())
    }
}
