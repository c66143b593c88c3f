//! # tansu-kernel
//!
//! A virtual file system over pluggable storage, where an entry may live in
//! more than one folder at once.
//!
//! The [`Driver`] is the only thing that changes the entry graph. It mounts a
//! [`Backend`](backend::Backend), hands out [`File`] and [`Folder`] handles,
//! keeps names unique per folder and the parent graph acyclic, and tells
//! registered hooks when entries load and folders finish scanning.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tansu_kernel::{Driver, EntryHandle, backend::MemoryBackend};
//!
//! # fn main() -> tansu_kernel::FsResult<()> {
//! let fs = Driver::mount(Arc::new(MemoryBackend::new()))?;
//! let root = fs.root()?;
//! let work = root.create_folder("docs/work", true)?;
//! let report = work.create_file("report.txt", b"q3 numbers")?;
//!
//! let shared = root.create_folder("shared", false)?;
//! shared.link_child(&report)?;
//! assert_eq!(report.parents()?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod entry;
pub mod error;
pub mod file;
pub mod folder;
pub mod hooks;

pub use config::{ConfigError, DriverConfig};
pub use driver::{Driver, EntryFactory, HashFunction};
pub use entry::{Entry, EntryHandle};
pub use error::{ErrorKind, FsError, FsResult};
pub use file::{ContentStream, File};
pub use folder::Folder;
pub use hooks::{FileHandler, FolderHandler, HookKind};

pub use tansu_types::{EntryId, EntryKind, Hash, LoadState, Properties, Stat};
