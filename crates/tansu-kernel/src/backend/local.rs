//! Local filesystem backend.
//!
//! Provides access to a real directory tree, with path security to prevent
//! escaping the root directory. Entry ids are `dev:inode`, so hard links
//! created outside tansu show up as one entry with several parents.

use std::collections::HashMap;
use std::fs::{self, File, FileTimes};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use tansu_types::{EntryId, EntryKind, Hash, Properties, Stat};

use super::error::{BackendError, BackendResult};
use super::{Backend, Link};

/// Local filesystem backend.
///
/// All entries live below `root`. Symlinks and special files are skipped
/// during listing: the entry model only knows files and folders.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
    label: String,
    read_only: bool,
    /// Every known path of every entry seen so far. Files with several hard
    /// links have several paths; folders have exactly one.
    paths: RwLock<HashMap<EntryId, Vec<PathBuf>>>,
}

impl LocalBackend {
    /// Create a backend rooted at the given directory.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::build(root.into(), false)
    }

    /// Create a read-only backend.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self::build(root.into(), true)
    }

    fn build(root: PathBuf, read_only: bool) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        let label = format!("local:{}", root.display());
        Self {
            root,
            label,
            read_only,
            paths: RwLock::new(HashMap::new()),
        }
    }

    /// Get the root path.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> BackendResult<()> {
        if self.read_only {
            Err(BackendError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Derive the entry id from metadata.
    fn id_of(meta: &fs::Metadata) -> EntryId {
        EntryId::new(format!("{}:{}", meta.dev(), meta.ino()))
    }

    /// Convert std::fs::Metadata to a Stat.
    fn metadata_to_stat(name: &str, meta: &fs::Metadata) -> Stat {
        let kind = if meta.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let mut properties = Properties::new();
        properties.insert(
            "mode".to_string(),
            serde_json::json!(meta.permissions().mode()),
        );
        properties.insert("nlink".to_string(), serde_json::json!(meta.nlink()));

        Stat {
            id: Self::id_of(meta),
            name: name.to_string(),
            kind,
            size: if kind.is_file() { meta.len() } else { 0 },
            created: meta.created().unwrap_or(modified),
            modified,
            hash: Hash::Unknown,
            properties,
        }
    }

    /// First known path of an entry.
    fn path_of(&self, entry: &EntryId) -> BackendResult<PathBuf> {
        self.paths
            .read()
            .get(entry)
            .and_then(|paths| paths.first().cloned())
            .ok_or_else(|| BackendError::not_found(entry.to_string()))
    }

    /// Path of `name` inside the folder `parent`.
    fn child_path(&self, parent: &EntryId, name: &str) -> BackendResult<PathBuf> {
        let full = self.path_of(parent)?.join(name);
        if !full.starts_with(&self.root) || name.contains('/') || name == ".." {
            return Err(BackendError::path_escapes_root(full.display().to_string()));
        }
        Ok(full)
    }

    fn remember(&self, entry: &EntryId, path: PathBuf) {
        let mut paths = self.paths.write();
        let known = paths.entry(entry.clone()).or_default();
        if !known.contains(&path) {
            known.push(path);
        }
    }

    fn forget(&self, entry: &EntryId, path: &Path) {
        let mut paths = self.paths.write();
        if let Some(known) = paths.get_mut(entry) {
            known.retain(|p| p != path);
            if known.is_empty() {
                paths.remove(entry);
            }
        }
    }

    /// Replace `from` with `to` in every remembered path, including paths of
    /// descendants when a folder moved.
    fn repath(&self, from: &Path, to: &Path) {
        let mut paths = self.paths.write();
        for known in paths.values_mut() {
            for path in known.iter_mut() {
                if let Ok(rest) = path.strip_prefix(from) {
                    *path = if rest.as_os_str().is_empty() {
                        to.to_path_buf()
                    } else {
                        to.join(rest)
                    };
                }
            }
        }
    }

    fn stat_path(&self, path: &Path, name: &str) -> BackendResult<Stat> {
        let meta = fs::symlink_metadata(path)?;
        let stat = Self::metadata_to_stat(name, &meta);
        self.remember(&stat.id, path.to_path_buf());
        Ok(stat)
    }

    fn open_range(&self, file: &EntryId, offset: u64) -> BackendResult<File> {
        let path = self.path_of(file)?;
        let mut handle = File::open(&path)?;
        if handle.metadata()?.is_dir() {
            return Err(BackendError::is_a_directory(path.display().to_string()));
        }
        handle.seek(SeekFrom::Start(offset))?;
        Ok(handle)
    }
}

impl Backend for LocalBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn root(&self) -> BackendResult<Stat> {
        let root = self.root.clone();
        self.stat_path(&root, "")
    }

    fn list(&self, folder: &EntryId) -> BackendResult<Vec<Stat>> {
        let dir = self.path_of(folder)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = fs::symlink_metadata(entry.path())?;
            let file_type = meta.file_type();
            if !(file_type.is_dir() || file_type.is_file()) {
                tracing::trace!(path = %entry.path().display(), "skipping non-regular entry");
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let stat = Self::metadata_to_stat(&name, &meta);
            self.remember(&stat.id, entry.path());
            entries.push(stat);
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Vec<u8>> {
        let handle = self.open_range(file, offset)?;
        let mut buffer = Vec::new();
        handle.take(len).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn open(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Box<dyn Read + Send>> {
        // An open descriptor keeps the inode alive on unix, so a concurrent
        // unlink doesn't cut the stream short.
        let handle = self.open_range(file, offset)?;
        Ok(Box::new(handle.take(len)))
    }

    fn create_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> BackendResult<Stat> {
        self.check_writable()?;
        let path = self.child_path(parent, name)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(data)?;
        file.sync_all()?;

        self.stat_path(&path, name)
    }

    fn create_folder(&self, parent: &EntryId, name: &str) -> BackendResult<Stat> {
        self.check_writable()?;
        let path = self.child_path(parent, name)?;
        fs::create_dir(&path)?;
        self.stat_path(&path, name)
    }

    fn link(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        self.check_writable()?;
        let source = self.path_of(entry)?;
        if fs::symlink_metadata(&source)?.is_dir() {
            return Err(BackendError::unsupported(
                "hard links to directories are not supported by the local filesystem",
            ));
        }
        let target = self.child_path(parent, name)?;
        fs::hard_link(&source, &target)?;
        self.remember(entry, target);
        Ok(())
    }

    fn unlink(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        self.check_writable()?;
        let path = self.child_path(parent, name)?;
        let meta = fs::symlink_metadata(&path)?;
        if Self::id_of(&meta) != *entry {
            return Err(BackendError::not_found(format!(
                "{} is not {}",
                path.display(),
                entry
            )));
        }
        if meta.is_dir() {
            fs::remove_dir(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        self.forget(entry, &path);
        Ok(())
    }

    fn rename(&self, entry: &EntryId, links: &[Link], new_name: &str) -> BackendResult<Stat> {
        self.check_writable()?;
        let mut moves = Vec::with_capacity(links.len());
        for (parent, old_name) in links {
            let from = self.child_path(parent, old_name)?;
            if Self::id_of(&fs::symlink_metadata(&from)?) != *entry {
                return Err(BackendError::not_found(format!(
                    "{} is not {}",
                    from.display(),
                    entry
                )));
            }
            let to = self.child_path(parent, new_name)?;
            if from != to && to.exists() {
                return Err(BackendError::already_exists(to.display().to_string()));
            }
            moves.push((from, to));
        }

        for (done, (from, to)) in moves.iter().enumerate() {
            if let Err(e) = fs::rename(from, to) {
                // Put back the links already renamed.
                for (from, to) in moves[..done].iter().rev() {
                    if let Err(undo) = fs::rename(to, from) {
                        tracing::warn!(path = %to.display(), error = %undo, "rename rollback failed");
                    }
                }
                return Err(e.into());
            }
        }
        for (from, to) in &moves {
            self.repath(from, to);
        }

        let path = match moves.into_iter().next() {
            Some((_, to)) => to,
            None => self.path_of(entry)?,
        };
        self.stat_path(&path, new_name)
    }

    fn relocate(
        &self,
        entry: &EntryId,
        links: &[Link],
        to: &EntryId,
        new_name: &str,
    ) -> BackendResult<Stat> {
        self.check_writable()?;
        let ((first, old_name), rest) = links
            .split_first()
            .ok_or_else(|| BackendError::not_found(format!("{entry} has no parent")))?;

        let source = self.child_path(first, old_name)?;
        let target = self.child_path(to, new_name)?;
        if target.exists() {
            return Err(BackendError::already_exists(target.display().to_string()));
        }
        fs::rename(&source, &target)?;
        self.repath(&source, &target);

        // Remaining hard links are dropped: a move replaces the parent set.
        for (parent, link_name) in rest {
            let extra = self.child_path(parent, link_name)?;
            fs::remove_file(&extra)?;
            self.forget(entry, &extra);
        }

        self.stat_path(&target, new_name)
    }

    fn set_times(
        &self,
        entry: &EntryId,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()> {
        self.check_writable()?;
        if created.is_some() {
            return Err(BackendError::unsupported(
                "creation time cannot be set on the local filesystem",
            ));
        }
        if let Some(modified) = modified {
            let path = self.path_of(entry)?;
            let handle = File::open(&path)?;
            handle.set_times(FileTimes::new().set_modified(modified))?;
        }
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn close(&self) -> BackendResult<()> {
        self.paths.write().clear();
        Ok(())
    }
}
