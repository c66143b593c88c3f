//! Content reads and hashing.
//!
//! Reads never take the mutation lock. A read that already reached the
//! backend completes against whatever the backend hands out (a frozen
//! snapshot for [`MemoryBackend`], an open descriptor for [`LocalBackend`]);
//! a read issued after the entry left the index fails with `Gone`.
//!
//! [`MemoryBackend`]: crate::backend::MemoryBackend
//! [`LocalBackend`]: crate::backend::LocalBackend

use std::io;

use tansu_types::{EntryId, Hash};

use super::Driver;
use crate::backend::BackendError;
use crate::error::{FsError, FsResult};
use crate::file::{ContentStream, File};

/// Default hash function: BLAKE3 over the whole content, lowercase hex.
pub(super) fn blake3_hex(file: &File) -> FsResult<String> {
    let mut stream = file.open(0, None)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut stream, &mut hasher).map_err(BackendError::from)?;
    Ok(hasher.finalize().to_hex().to_string())
}

impl Driver {
    /// Resolve `offset`/`len` against the file's size.
    fn content_range(&self, file: &EntryId, offset: u64, len: Option<u64>) -> FsResult<u64> {
        self.check_open(file)?;
        let graph = self.inner.graph.read();
        let node = graph.node(file)?;
        if !node.stat.is_file() {
            return Err(FsError::invalid_target(format!("{file} is not a file")));
        }
        let size = node.stat.size;
        if offset > size {
            return Err(FsError::OutOfRange { offset, size });
        }
        let remaining = size - offset;
        Ok(len.map_or(remaining, |len| len.min(remaining)))
    }

    /// Backend failures for an entry that meanwhile left the index are `Gone`.
    fn read_error(&self, file: &EntryId, e: BackendError) -> FsError {
        if self.inner.graph.read().contains(file) {
            FsError::Backend(e)
        } else {
            FsError::gone(file)
        }
    }

    /// Read a byte range. `len` defaults to the rest of the file.
    pub fn read_content(&self, file: &EntryId, offset: u64, len: Option<u64>) -> FsResult<Vec<u8>> {
        let len = self.content_range(file, offset, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.inner
            .backend
            .read(file, offset, len)
            .map_err(|e| self.read_error(file, e))
    }

    /// Open a stream over a byte range. The backend handle is released when
    /// the stream is dropped, however far it was read.
    pub fn open_content(
        &self,
        file: &EntryId,
        offset: u64,
        len: Option<u64>,
    ) -> FsResult<ContentStream> {
        let len = self.content_range(file, offset, len)?;
        let reader = self
            .inner
            .backend
            .open(file, offset, len)
            .map_err(|e| self.read_error(file, e))?;
        Ok(ContentStream::new(file.clone(), reader, len))
    }

    /// True if the file's hash is known without computing it.
    pub fn has_hash(&self, file: &EntryId) -> FsResult<bool> {
        Ok(self.stat(file)?.hash.is_known())
    }

    /// The file's hash: the stored one if known, else the hash function's
    /// result.
    ///
    /// The hash function runs once per call. Its result is stored on the
    /// entry only when `cache_computed_hashes` is set. Failures surface as
    /// backend failures and are never cached.
    pub fn hash_file(&self, file: &EntryId) -> FsResult<String> {
        let stat = self.stat(file)?;
        if !stat.is_file() {
            return Err(FsError::invalid_target(format!("{file} is not a file")));
        }
        if let Hash::Known(digest) = stat.hash {
            return Ok(digest);
        }

        let hasher = self.inner.hasher.read().clone();
        let digest = hasher(&File::new(file.clone(), self.clone())).map_err(|e| match e {
            FsError::Gone(_) | FsError::Backend(_) => e,
            other => FsError::Backend(BackendError::Hash(other.to_string())),
        })?;

        if self.inner.config.cache_computed_hashes {
            if let Some(node) = self.inner.graph.write().get_mut(file) {
                node.stat.hash = Hash::Known(digest.clone());
            }
        }
        tracing::debug!(file = %file, cached = self.inner.config.cache_computed_hashes, "computed hash");
        Ok(digest)
    }
}
