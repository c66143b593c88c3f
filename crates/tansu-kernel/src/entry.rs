//! Entry handles.
//!
//! Handles are lightweight: an id plus a driver clone. They never cache
//! attributes, so two handles to the same id always agree, and a handle to a
//! purged entry fails with `Gone` instead of showing stale data.

use std::time::SystemTime;

use tansu_types::{EntryId, EntryKind, Properties, Stat};

use crate::driver::Driver;
use crate::error::FsResult;
use crate::file::File;
use crate::folder::Folder;

/// Operations shared by files and folders.
pub trait EntryHandle {
    fn id(&self) -> &EntryId;

    fn driver(&self) -> &Driver;

    /// Size in bytes. Folders report the sum of distinct descendant files.
    fn size(&self) -> FsResult<u64>;

    /// Snapshot of the indexed attributes.
    fn stat(&self) -> FsResult<Stat> {
        self.driver().stat(self.id())
    }

    fn name(&self) -> FsResult<String> {
        Ok(self.stat()?.name)
    }

    /// Canonical path, through first-linked parents.
    fn path(&self) -> FsResult<String> {
        self.driver().path(self.id())
    }

    fn created_time(&self) -> FsResult<SystemTime> {
        Ok(self.stat()?.created)
    }

    fn modified_time(&self) -> FsResult<SystemTime> {
        Ok(self.stat()?.modified)
    }

    /// Backend-specific metadata. Empty when the backend has none.
    fn properties(&self) -> FsResult<Properties> {
        self.driver().properties(self.id())
    }

    /// Parent folders in link order.
    fn parents(&self) -> FsResult<Vec<Folder>> {
        self.driver().parents(self.id())
    }

    /// The first parent. `None` for the root.
    fn parent(&self) -> FsResult<Option<Folder>> {
        Ok(self.parents()?.into_iter().next())
    }

    /// True while the entry is indexed.
    fn exists(&self) -> bool {
        self.stat().is_ok()
    }

    /// Rename under every parent. Use the returned handle from here on.
    fn rename(&self, new_name: &str, overwrite: bool) -> FsResult<Entry> {
        self.driver().rename_entry(self.id(), new_name, overwrite)
    }

    /// Move under `parent`, dropping all current parents. Use the returned
    /// handle from here on.
    fn move_to(&self, parent: &Folder, new_name: Option<&str>, overwrite: bool) -> FsResult<Entry> {
        self.driver()
            .move_entry(self.id(), parent.id(), new_name, overwrite)
    }

    fn set_created_time(&self, time: SystemTime) -> FsResult<()> {
        self.driver().set_created_time(self.id(), time)
    }

    fn set_modified_time(&self, time: SystemTime) -> FsResult<()> {
        self.driver().set_modified_time(self.id(), time)
    }
}

/// A file or a folder.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    File(File),
    Folder(Folder),
}

impl Entry {
    pub(crate) fn from_kind(kind: EntryKind, id: EntryId, driver: Driver) -> Self {
        match kind {
            EntryKind::File => Entry::File(File::new(id, driver)),
            EntryKind::Folder => Entry::Folder(Folder::new(id, driver)),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Folder(_) => EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder(_))
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Entry::Folder(folder) => Some(folder),
            Entry::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Folder(_) => None,
        }
    }

    pub fn into_folder(self) -> Option<Folder> {
        match self {
            Entry::Folder(folder) => Some(folder),
            Entry::File(_) => None,
        }
    }

    /// Remove from all parents. `recursive` only matters for folders.
    pub fn delete(&self, recursive: bool) -> FsResult<bool> {
        self.driver().delete_entry(self.id(), recursive)
    }
}

impl EntryHandle for Entry {
    fn id(&self) -> &EntryId {
        match self {
            Entry::File(file) => file.id(),
            Entry::Folder(folder) => folder.id(),
        }
    }

    fn driver(&self) -> &Driver {
        match self {
            Entry::File(file) => file.driver(),
            Entry::Folder(folder) => folder.driver(),
        }
    }

    fn size(&self) -> FsResult<u64> {
        match self {
            Entry::File(file) => file.size(),
            Entry::Folder(folder) => folder.size(),
        }
    }
}

impl From<File> for Entry {
    fn from(file: File) -> Self {
        Entry::File(file)
    }
}

impl From<Folder> for Entry {
    fn from(folder: Folder) -> Self {
        Entry::Folder(folder)
    }
}
