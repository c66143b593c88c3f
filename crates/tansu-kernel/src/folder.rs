//! Folder handles.

use std::fmt;

use tansu_types::EntryId;

use crate::driver::Driver;
use crate::entry::{Entry, EntryHandle};
use crate::error::FsResult;
use crate::file::File;

/// Handle to a folder.
#[derive(Clone)]
pub struct Folder {
    id: EntryId,
    driver: Driver,
}

impl Folder {
    pub(crate) fn new(id: EntryId, driver: Driver) -> Self {
        Self { id, driver }
    }

    /// True if this is the driver's root.
    pub fn is_root(&self) -> bool {
        self.driver.is_root(&self.id)
    }

    /// The child named `name`, or `None`.
    pub fn child(&self, name: &str) -> FsResult<Option<Entry>> {
        self.driver.entry_from_folder(&self.id, name)
    }

    pub fn has_child(&self, name: &str) -> FsResult<bool> {
        self.driver.has_child(&self.id, name)
    }

    /// Snapshot of the direct children in insertion order.
    pub fn children(&self) -> FsResult<Vec<Entry>> {
        self.driver.entries(&self.id)
    }

    /// True if `child` is linked directly in this folder.
    pub fn is_parent(&self, child: &impl EntryHandle) -> FsResult<bool> {
        self.driver.is_parent(&self.id, child.id())
    }

    pub fn create_file(&self, name: &str, data: &[u8]) -> FsResult<File> {
        self.driver.create_file(&self.id, name, data)
    }

    /// Create a folder. With `recursive`, `name` may be a `/`-separated path
    /// whose existing segments are reused.
    pub fn create_folder(&self, name: &str, recursive: bool) -> FsResult<Folder> {
        if recursive {
            self.driver.create_folder_all(&self.id, name)
        } else {
            self.driver.create_folder(&self.id, name)
        }
    }

    /// Remove from all parents. A populated folder needs `recursive`.
    pub fn delete(&self, recursive: bool) -> FsResult<bool> {
        self.driver.delete_entry(&self.id, recursive)
    }

    /// Link an existing entry here as an extra parent.
    pub fn link_child(&self, child: &impl EntryHandle) -> FsResult<()> {
        self.driver.link(child.id(), &self.id)
    }

    /// Remove `child` from this folder only.
    pub fn unlink_child(&self, child: &impl EntryHandle) -> FsResult<bool> {
        self.driver.unlink(child.id(), &self.id)
    }

    /// Every distinct file below this folder.
    pub fn files_recursive(&self) -> FsResult<Vec<File>> {
        self.driver.files_recursive(&self.id)
    }

    /// Re-enumerate children from the backend.
    pub fn refresh(&self) -> FsResult<()> {
        self.driver.refresh(&self.id)
    }
}

impl EntryHandle for Folder {
    fn id(&self) -> &EntryId {
        &self.id
    }

    fn driver(&self) -> &Driver {
        &self.driver
    }

    fn size(&self) -> FsResult<u64> {
        self.driver.folder_size(&self.id)
    }
}

impl PartialEq for Folder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.driver.same_mount(&other.driver)
    }
}

impl fmt::Debug for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Folder").field(&self.id).finish()
    }
}
