//! Storage backends.
//!
//! A [`Backend`] is the storage collaborator behind a [`Driver`](crate::Driver):
//! it allocates ids, enumerates children, serves byte ranges and applies
//! structural changes to the backing store. It holds no graph invariants of
//! its own beyond what the store enforces. Name collisions, cycles and
//! multi-parent bookkeeping are the driver's job.
//!
//! ## Design Decisions
//!
//! - **Id-based, not path-based**: every call names entries by [`EntryId`],
//!   plus the parent and name when a single link is meant. Backends that
//!   think in paths (like [`LocalBackend`]) map ids to paths internally.
//! - **Explicit offset/len**: reads take a byte range, so a file never keeps
//!   a live handle between calls.
//! - **Synchronous**: asynchronous stores present a blocking facade here.

mod error;
mod local;
mod memory;

pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;

use std::io::{self, Read};
use std::time::SystemTime;

use tansu_types::{EntryId, Stat};

/// One link of an entry: the parent folder and the name it has there.
pub type Link = (EntryId, String);

/// Storage operations the driver consumes.
pub trait Backend: Send + Sync {
    /// Short label for logs (e.g. "memory", "local:/srv/data").
    fn label(&self) -> &str;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Stat of the root folder.
    fn root(&self) -> BackendResult<Stat>;

    /// Direct children of a folder, in a stable order.
    fn list(&self, folder: &EntryId) -> BackendResult<Vec<Stat>>;

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes if EOF is reached.
    fn read(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Vec<u8>>;

    /// Open a reader over a byte range.
    ///
    /// The returned reader owns whatever handle the backend needs and
    /// releases it when dropped. The default buffers the range via [`read`].
    ///
    /// [`read`]: Backend::read
    fn open(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Box<dyn Read + Send>> {
        let data = self.read(file, offset, len)?;
        Ok(Box::new(io::Cursor::new(data)))
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a file below `parent`.
    fn create_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> BackendResult<Stat>;

    /// Create an empty folder below `parent`.
    fn create_folder(&self, parent: &EntryId, name: &str) -> BackendResult<Stat>;

    /// Add another link to an existing entry.
    fn link(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()>;

    /// Remove one link. Storage is released once the last link is gone.
    fn unlink(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()>;

    /// Rename every link of the entry to `new_name`.
    ///
    /// `links` holds each parent with the name the entry has there; hard
    /// links found in the store may differ per parent. Implementations check
    /// all links before changing any. Returns the entry's stat afterwards;
    /// its id may differ if the store can't rename in place.
    fn rename(&self, entry: &EntryId, links: &[Link], new_name: &str) -> BackendResult<Stat>;

    /// Move the entry out of every one of `links` into `to` as `new_name`.
    ///
    /// Returns the entry's stat afterwards; its id may differ if the store
    /// can't move in place.
    fn relocate(
        &self,
        entry: &EntryId,
        links: &[Link],
        to: &EntryId,
        new_name: &str,
    ) -> BackendResult<Stat>;

    /// Update timestamps. `None` leaves a value untouched.
    fn set_times(
        &self,
        entry: &EntryId,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()>;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Returns true if this backend rejects writes.
    fn read_only(&self) -> bool {
        false
    }

    /// Release backend resources. Called once by `Driver::close`.
    fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}
