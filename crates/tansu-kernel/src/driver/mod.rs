//! The driver: sole authority over the entry graph.
//!
//! A [`Driver`] owns the id index, the root, the factories, the hash
//! function and the lifecycle hooks for one mounted backend. Entry handles
//! ([`File`], [`Folder`]) carry only an id and a driver clone; every read
//! resolves through the index and every structural change goes through the
//! driver.
//!
//! # Locking
//!
//! - The graph sits behind a `parking_lot::RwLock`. Each structural change
//!   applies its graph edits under one write guard, so readers never see a
//!   half-applied rename or move.
//! - Structural changes and scans are serialized by a re-entrant mutex.
//!   Factories and hooks run on the mutating thread and may call back into
//!   the driver; a callback that mutates a folder while that same folder is
//!   mid-scan gets `Conflict`.
//! - Content reads take neither lock beyond a brief index lookup.
//!
//! No graph guard is ever held across a backend call, a factory or a hook.

mod content;
mod graph;
mod mutate;
mod scan;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{ReentrantMutex, RwLock};
use tansu_types::{EntryId, EntryKind, Properties, Stat, split_path};

use crate::backend::Backend;
use crate::config::DriverConfig;
use crate::entry::Entry;
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::folder::Folder;
use crate::hooks::{FileHandler, FolderHandler, HookKind, HookRegistry};

use graph::Graph;

/// Builds the stat the driver indexes for a freshly seen backend entry.
///
/// Receives the driver, the backend's stat and the parent folder (absent for
/// the root). The returned id and kind are overridden with the backend's.
pub type EntryFactory = Arc<dyn Fn(&Driver, Stat, Option<&Folder>) -> Stat + Send + Sync>;

/// Computes a digest for a file without a stored hash.
pub type HashFunction = Arc<dyn Fn(&File) -> FsResult<String> + Send + Sync>;

/// Lifecycle notification queued during a locked section, fired after it.
#[derive(Debug)]
pub(crate) enum Event {
    FileLoaded(EntryId),
    FolderLoaded(EntryId),
    FolderScanned(EntryId),
}

struct DriverInner {
    backend: Arc<dyn Backend>,
    config: DriverConfig,
    graph: RwLock<Graph>,
    mutations: ReentrantMutex<()>,
    file_factory: RwLock<EntryFactory>,
    folder_factory: RwLock<EntryFactory>,
    hasher: RwLock<HashFunction>,
    hooks: HookRegistry,
    closed: AtomicBool,
}

/// Handle to a mounted file system. Cheap to clone.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("backend", &self.inner.backend.label())
            .field("entries", &self.inner.graph.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Driver {
    /// Mount a backend with the default configuration.
    pub fn mount(backend: Arc<dyn Backend>) -> FsResult<Self> {
        Self::with_config(backend, DriverConfig::default())
    }

    /// Mount a backend.
    ///
    /// The root is loaded lazily on first use unless
    /// `scan_root_on_mount` is set, so hooks registered right after mounting
    /// still see the root load.
    pub fn with_config(backend: Arc<dyn Backend>, config: DriverConfig) -> FsResult<Self> {
        let identity: EntryFactory = Arc::new(|_, stat, _| stat);
        let hasher: HashFunction = Arc::new(content::blake3_hex);

        let driver = Self {
            inner: Arc::new(DriverInner {
                backend,
                config,
                graph: RwLock::new(Graph::new()),
                mutations: ReentrantMutex::new(()),
                file_factory: RwLock::new(identity.clone()),
                folder_factory: RwLock::new(identity),
                hasher: RwLock::new(hasher),
                hooks: HookRegistry::new(),
                closed: AtomicBool::new(false),
            }),
        };

        tracing::info!(
            backend = driver.inner.backend.label(),
            read_only = driver.inner.backend.read_only(),
            "mounted file system"
        );

        if driver.inner.config.scan_root_on_mount {
            let root = driver.ensure_root()?;
            driver.ensure_scanned(&root)?;
        }
        Ok(driver)
    }

    /// The configuration this driver was mounted with.
    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    /// Backend label, for logs and diagnostics.
    pub fn backend_label(&self) -> &str {
        self.inner.backend.label()
    }

    /// Number of entries currently indexed.
    pub fn indexed_len(&self) -> usize {
        self.inner.graph.read().len()
    }

    /// True if both handles refer to the same mounted instance.
    pub fn same_mount(&self, other: &Driver) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// The root folder.
    pub fn root(&self) -> FsResult<Folder> {
        let id = self.ensure_root()?;
        Ok(Folder::new(id, self.clone()))
    }

    /// Look up an indexed entry by id.
    ///
    /// Only entries the driver has already materialized are found; unscanned
    /// parts of the backend are not searched.
    pub fn entry_by_id(&self, id: &EntryId) -> FsResult<Option<Entry>> {
        self.check_open(id)?;
        let kind = self.inner.graph.read().get(id).map(|n| n.stat.kind);
        Ok(kind.map(|kind| Entry::from_kind(kind, id.clone(), self.clone())))
    }

    /// Resolve a `/`-separated path from the root.
    ///
    /// `..` steps to the first parent and stops at the root. Walking through
    /// a file, or a missing segment, yields `None`.
    pub fn entry_by_path(&self, path: &str) -> FsResult<Option<Entry>> {
        let mut current = self.ensure_root()?;
        let mut kind = EntryKind::Folder;

        for segment in split_path(path) {
            if kind.is_file() {
                return Ok(None);
            }
            if segment == ".." {
                let parent = self.inner.graph.read().node(&current)?.parents.first().cloned();
                if let Some(parent) = parent {
                    current = parent;
                }
                continue;
            }
            match self.child_of(&current, segment)? {
                Some((id, child_kind)) => {
                    current = id;
                    kind = child_kind;
                }
                None => return Ok(None),
            }
        }
        Ok(Some(Entry::from_kind(kind, current, self.clone())))
    }

    /// A named child of a folder, scanning the folder first if needed.
    pub fn entry_from_folder(&self, folder: &EntryId, name: &str) -> FsResult<Option<Entry>> {
        Ok(self
            .child_of(folder, name)?
            .map(|(id, kind)| Entry::from_kind(kind, id, self.clone())))
    }

    /// Direct children of a folder in insertion order.
    pub fn entries(&self, folder: &EntryId) -> FsResult<Vec<Entry>> {
        self.ensure_scanned(folder)?;
        let graph = self.inner.graph.read();
        let node = graph.folder(folder)?;
        Ok(node
            .children
            .values()
            .filter_map(|id| {
                graph
                    .get(id)
                    .map(|c| Entry::from_kind(c.stat.kind, id.clone(), self.clone()))
            })
            .collect())
    }

    /// Every distinct file below a folder, scanning as deep as needed.
    pub fn files_recursive(&self, folder: &EntryId) -> FsResult<Vec<File>> {
        self.scan_subtree(folder)?;
        let files = self.inner.graph.read().descendant_files(folder);
        Ok(files
            .into_iter()
            .map(|id| File::new(id, self.clone()))
            .collect())
    }

    // ========================================================================
    // Factories, hashing and hooks
    // ========================================================================

    /// Replace the factory used for files seen from now on.
    pub fn set_file_factory<F>(&self, factory: F)
    where
        F: Fn(&Driver, Stat, Option<&Folder>) -> Stat + Send + Sync + 'static,
    {
        *self.inner.file_factory.write() = Arc::new(factory);
    }

    /// Replace the factory used for folders seen from now on.
    pub fn set_folder_factory<F>(&self, factory: F)
    where
        F: Fn(&Driver, Stat, Option<&Folder>) -> Stat + Send + Sync + 'static,
    {
        *self.inner.folder_factory.write() = Arc::new(factory);
    }

    /// Replace the hash function used for files without a stored hash.
    pub fn set_hash_function<F>(&self, hasher: F)
    where
        F: Fn(&File) -> FsResult<String> + Send + Sync + 'static,
    {
        *self.inner.hasher.write() = Arc::new(hasher);
    }

    /// Register a handler fired after a file is constructed and indexed.
    ///
    /// Returns the handler name: `name` if given, otherwise a generated one.
    pub fn register_file_loaded_handler<F>(&self, name: Option<&str>, handler: F) -> String
    where
        F: Fn(&File) + Send + Sync + 'static,
    {
        let handler: FileHandler = Arc::new(handler);
        self.inner.hooks.register_file(name, handler)
    }

    /// Register a handler fired after a folder is constructed and indexed.
    pub fn register_folder_loaded_handler<F>(&self, name: Option<&str>, handler: F) -> String
    where
        F: Fn(&Folder) + Send + Sync + 'static,
    {
        let handler: FolderHandler = Arc::new(handler);
        self.inner
            .hooks
            .register_folder(HookKind::FolderLoaded, name, handler)
    }

    /// Register a handler fired once a folder's children are all linked.
    pub fn register_folder_scanned_handler<F>(&self, name: Option<&str>, handler: F) -> String
    where
        F: Fn(&Folder) + Send + Sync + 'static,
    {
        let handler: FolderHandler = Arc::new(handler);
        self.inner
            .hooks
            .register_folder(HookKind::FolderScanned, name, handler)
    }

    pub fn unregister_file_loaded_handler(&self, name: &str) -> bool {
        self.inner.hooks.unregister(HookKind::FileLoaded, name)
    }

    pub fn unregister_folder_loaded_handler(&self, name: &str) -> bool {
        self.inner.hooks.unregister(HookKind::FolderLoaded, name)
    }

    pub fn unregister_folder_scanned_handler(&self, name: &str) -> bool {
        self.inner.hooks.unregister(HookKind::FolderScanned, name)
    }

    /// Names of the registered handlers of one kind, in registration order.
    pub fn handler_names(&self, kind: HookKind) -> Vec<String> {
        self.inner.hooks.names(kind)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Tear the file system down.
    ///
    /// Releases backend resources and empties the index. Every later
    /// operation fails with `Gone`. Closing twice is a no-op.
    pub fn close(&self) -> FsResult<()> {
        let _guard = self.inner.mutations.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dropped = {
            let mut graph = self.inner.graph.write();
            let len = graph.len();
            graph.clear();
            len
        };
        self.inner.backend.close()?;
        tracing::info!(
            backend = self.inner.backend.label(),
            dropped,
            "closed file system"
        );
        Ok(())
    }

    // ========================================================================
    // Attribute access for handles
    // ========================================================================

    pub(crate) fn stat(&self, id: &EntryId) -> FsResult<Stat> {
        self.check_open(id)?;
        Ok(self.inner.graph.read().node(id)?.stat.clone())
    }

    pub(crate) fn properties(&self, id: &EntryId) -> FsResult<Properties> {
        Ok(self.stat(id)?.properties)
    }

    pub(crate) fn path(&self, id: &EntryId) -> FsResult<String> {
        self.check_open(id)?;
        self.inner.graph.read().path(id)
    }

    pub(crate) fn parents(&self, id: &EntryId) -> FsResult<Vec<Folder>> {
        self.check_open(id)?;
        let parents = self.inner.graph.read().node(id)?.parents.clone();
        Ok(parents
            .into_iter()
            .map(|p| Folder::new(p, self.clone()))
            .collect())
    }

    /// Sum of distinct descendant file sizes.
    pub(crate) fn folder_size(&self, id: &EntryId) -> FsResult<u64> {
        self.scan_subtree(id)?;
        let graph = self.inner.graph.read();
        Ok(graph
            .descendant_files(id)
            .iter()
            .filter_map(|f| graph.get(f).map(|n| n.stat.size))
            .sum())
    }

    pub(crate) fn is_root(&self, id: &EntryId) -> bool {
        self.inner.graph.read().is_root(id)
    }

    pub(crate) fn has_child(&self, folder: &EntryId, name: &str) -> FsResult<bool> {
        Ok(self.child_of(folder, name)?.is_some())
    }

    /// True if `child` is linked directly in `folder` under any name.
    pub(crate) fn is_parent(&self, folder: &EntryId, child: &EntryId) -> FsResult<bool> {
        self.check_open(folder)?;
        let graph = self.inner.graph.read();
        graph.folder(folder)?;
        Ok(graph
            .get(child)
            .is_some_and(|n| n.parents.contains(folder)))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_open(&self, id: &EntryId) -> FsResult<()> {
        if self.is_closed() {
            Err(FsError::gone(id))
        } else {
            Ok(())
        }
    }

    /// Root id, loading the root from the backend on first use.
    fn ensure_root(&self) -> FsResult<EntryId> {
        let closed_root = EntryId::new("/");
        self.check_open(&closed_root)?;
        if let Some(root) = self.inner.graph.read().root().cloned() {
            return Ok(root);
        }

        let guard = self.inner.mutations.lock();
        // Another thread may have won the race, or close() ran meanwhile.
        self.check_open(&closed_root)?;
        if let Some(root) = self.inner.graph.read().root().cloned() {
            return Ok(root);
        }

        let stat = self.inner.backend.root()?;
        let stat = self.materialize(stat, None);
        let id = stat.id.clone();
        self.inner.graph.write().set_root(stat);
        drop(guard);

        tracing::debug!(root = %id, "loaded root");
        self.fire(vec![Event::FolderLoaded(id.clone())]);
        Ok(id)
    }

    fn child_of(&self, folder: &EntryId, name: &str) -> FsResult<Option<(EntryId, EntryKind)>> {
        self.ensure_scanned(folder)?;
        let graph = self.inner.graph.read();
        graph.folder(folder)?;
        Ok(graph.child(folder, name).and_then(|id| {
            graph
                .get(id)
                .map(|n| (id.clone(), n.stat.kind))
        }))
    }

    /// Scan `folder` and every folder below it.
    fn scan_subtree(&self, folder: &EntryId) -> FsResult<()> {
        let mut seen = HashSet::new();
        let mut stack = vec![folder.clone()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            self.ensure_scanned(&current)?;
            let graph = self.inner.graph.read();
            for child in graph.children(&current) {
                if graph.get(&child).is_some_and(|n| n.stat.is_folder()) {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }

    /// Run the current factory for a backend stat.
    ///
    /// Must be called without a graph guard held: factories may read back
    /// through the driver.
    fn materialize(&self, stat: Stat, parent: Option<&EntryId>) -> Stat {
        let factory = if stat.is_file() {
            self.inner.file_factory.read().clone()
        } else {
            self.inner.folder_factory.read().clone()
        };
        let parent = parent.map(|id| Folder::new(id.clone(), self.clone()));
        let id = stat.id.clone();
        let kind = stat.kind;

        let mut built = factory(self, stat, parent.as_ref());
        built.id = id;
        built.kind = kind;
        built
    }

    /// Fire queued notifications, in order. Called with no graph guard held.
    fn fire(&self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::FileLoaded(id) => {
                    self.inner.hooks.fire_file_loaded(&File::new(id, self.clone()));
                }
                Event::FolderLoaded(id) => {
                    self.inner
                        .hooks
                        .fire_folder_loaded(&Folder::new(id, self.clone()));
                }
                Event::FolderScanned(id) => {
                    self.inner
                        .hooks
                        .fire_folder_scanned(&Folder::new(id, self.clone()));
                }
            }
        }
    }
}
