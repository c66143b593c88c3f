//! Lifecycle hooks.
//!
//! Handlers are stored by name. Callers may pick the name or let the registry
//! generate one (`file-loaded-1`, `folder-scanned-3`, ...); generated names
//! are never reused within a driver. Registering under an existing name
//! replaces that handler in place.
//!
//! Handlers never run under the graph lock. They run on the thread that
//! caused the event, and the structural lock is re-entrant, so a handler may
//! call back into the driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::file::File;
use crate::folder::Folder;

/// Callback fired with a file handle.
pub type FileHandler = Arc<dyn Fn(&File) + Send + Sync>;

/// Callback fired with a folder handle.
pub type FolderHandler = Arc<dyn Fn(&Folder) + Send + Sync>;

/// The three lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// A file was constructed and indexed.
    FileLoaded,
    /// A folder was constructed and indexed.
    FolderLoaded,
    /// All children of a folder were enumerated and linked.
    FolderScanned,
}

impl HookKind {
    fn prefix(self) -> &'static str {
        match self {
            HookKind::FileLoaded => "file-loaded",
            HookKind::FolderLoaded => "folder-loaded",
            HookKind::FolderScanned => "folder-scanned",
        }
    }
}

struct HandlerMap<H> {
    handlers: RwLock<IndexMap<String, H>>,
}

impl<H: Clone> HandlerMap<H> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(IndexMap::new()),
        }
    }

    fn insert(&self, name: String, handler: H) {
        self.handlers.write().insert(name, handler);
    }

    fn remove(&self, name: &str) -> bool {
        self.handlers.write().shift_remove(name).is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registration-ordered copy, so firing doesn't hold the lock.
    fn snapshot(&self) -> Vec<H> {
        self.handlers.read().values().cloned().collect()
    }

    fn names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

/// Named handler registry for one driver.
pub(crate) struct HookRegistry {
    file_loaded: HandlerMap<FileHandler>,
    folder_loaded: HandlerMap<FolderHandler>,
    folder_scanned: HandlerMap<FolderHandler>,
    next_id: AtomicU64,
}

impl HookRegistry {
    pub(crate) fn new() -> Self {
        Self {
            file_loaded: HandlerMap::new(),
            folder_loaded: HandlerMap::new(),
            folder_scanned: HandlerMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn contains(&self, kind: HookKind, name: &str) -> bool {
        match kind {
            HookKind::FileLoaded => self.file_loaded.contains(name),
            HookKind::FolderLoaded => self.folder_loaded.contains(name),
            HookKind::FolderScanned => self.folder_scanned.contains(name),
        }
    }

    /// Resolve the caller's name or generate a fresh one.
    fn name_for(&self, kind: HookKind, name: Option<&str>) -> String {
        if let Some(name) = name {
            return name.to_string();
        }
        loop {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("{}-{}", kind.prefix(), n);
            if !self.contains(kind, &candidate) {
                return candidate;
            }
        }
    }

    pub(crate) fn register_file(&self, name: Option<&str>, handler: FileHandler) -> String {
        let name = self.name_for(HookKind::FileLoaded, name);
        self.file_loaded.insert(name.clone(), handler);
        tracing::debug!(hook = %name, "registered file-loaded handler");
        name
    }

    pub(crate) fn register_folder(
        &self,
        kind: HookKind,
        name: Option<&str>,
        handler: FolderHandler,
    ) -> String {
        let name = self.name_for(kind, name);
        match kind {
            HookKind::FolderScanned => self.folder_scanned.insert(name.clone(), handler),
            _ => self.folder_loaded.insert(name.clone(), handler),
        }
        tracing::debug!(hook = %name, kind = kind.prefix(), "registered folder handler");
        name
    }

    pub(crate) fn unregister(&self, kind: HookKind, name: &str) -> bool {
        match kind {
            HookKind::FileLoaded => self.file_loaded.remove(name),
            HookKind::FolderLoaded => self.folder_loaded.remove(name),
            HookKind::FolderScanned => self.folder_scanned.remove(name),
        }
    }

    pub(crate) fn names(&self, kind: HookKind) -> Vec<String> {
        match kind {
            HookKind::FileLoaded => self.file_loaded.names(),
            HookKind::FolderLoaded => self.folder_loaded.names(),
            HookKind::FolderScanned => self.folder_scanned.names(),
        }
    }

    pub(crate) fn fire_file_loaded(&self, file: &File) {
        for handler in self.file_loaded.snapshot() {
            handler(file);
        }
    }

    pub(crate) fn fire_folder_loaded(&self, folder: &Folder) {
        for handler in self.folder_loaded.snapshot() {
            handler(folder);
        }
    }

    pub(crate) fn fire_folder_scanned(&self, folder: &Folder) {
        for handler in self.folder_scanned.snapshot() {
            handler(folder);
        }
    }
}
