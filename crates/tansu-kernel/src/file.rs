//! File handles and content streams.

use std::fmt;
use std::io::{self, Read};

use tansu_types::EntryId;

use crate::driver::Driver;
use crate::entry::EntryHandle;
use crate::error::FsResult;

/// Handle to a file.
#[derive(Clone)]
pub struct File {
    id: EntryId,
    driver: Driver,
}

impl File {
    pub(crate) fn new(id: EntryId, driver: Driver) -> Self {
        Self { id, driver }
    }

    /// The whole content.
    pub fn content(&self) -> FsResult<Vec<u8>> {
        self.driver.read_content(&self.id, 0, None)
    }

    /// A byte range. `len` defaults to the rest of the file; fails with
    /// `OutOfRange` if `offset` is past the end.
    pub fn content_range(&self, offset: u64, len: Option<u64>) -> FsResult<Vec<u8>> {
        self.driver.read_content(&self.id, offset, len)
    }

    /// Stream a byte range. Same range rules as [`content_range`](Self::content_range).
    pub fn open(&self, offset: u64, len: Option<u64>) -> FsResult<ContentStream> {
        self.driver.open_content(&self.id, offset, len)
    }

    /// True if the hash is known without running the hash function.
    pub fn has_hash(&self) -> FsResult<bool> {
        self.driver.has_hash(&self.id)
    }

    /// Stored hash, or the driver's hash function's result.
    pub fn hash(&self) -> FsResult<String> {
        self.driver.hash_file(&self.id)
    }

    /// Remove from all parents. Returns false if already gone.
    pub fn delete(&self) -> FsResult<bool> {
        self.driver.delete_entry(&self.id, false)
    }
}

impl EntryHandle for File {
    fn id(&self) -> &EntryId {
        &self.id
    }

    fn driver(&self) -> &Driver {
        &self.driver
    }

    fn size(&self) -> FsResult<u64> {
        Ok(self.stat()?.size)
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.driver.same_mount(&other.driver)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("File").field(&self.id).finish()
    }
}

/// Reader over a file's byte range.
///
/// Owns the backend handle and releases it on drop, whether the stream was
/// read to the end, abandoned early or failed midway.
pub struct ContentStream {
    id: EntryId,
    reader: Box<dyn Read + Send>,
    remaining: u64,
    consumed: u64,
}

impl ContentStream {
    pub(crate) fn new(id: EntryId, reader: Box<dyn Read + Send>, len: u64) -> Self {
        Self {
            id,
            reader,
            remaining: len,
            consumed: 0,
        }
    }

    /// Bytes still expected before the range ends.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = self.reader.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl Drop for ContentStream {
    fn drop(&mut self) {
        tracing::trace!(
            file = %self.id,
            consumed = self.consumed,
            abandoned = self.remaining > 0,
            "released content stream"
        );
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("file", &self.id)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
