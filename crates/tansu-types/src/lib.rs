//! Shared entry types for tansu.
//!
//! This crate is the data foundation of the file-system graph: entry ids,
//! entry kinds, stored hashes, backend stats and name rules. It has **no
//! internal tansu dependencies**. It is a leaf crate that the kernel and
//! every backend build on.
//!
//! # Overview
//!
//! ```text
//! Driver (tansu-kernel) ← sole authority over the graph
//!     └── indexes Stat records by EntryId
//!     └── Folder children: name → EntryId
//!     └── Entry parents: ordered set of EntryId (multi-parent, hard links)
//!
//! Backend ← storage collaborator
//!     └── allocates EntryId
//!     └── reports Stat (name, kind, size, times, Hash, Properties)
//! ```
//!
//! # Key Types
//!
//! |-----------------|------------------------------------------------|
//! | Type            | Purpose                                        |
//! |-----------------|------------------------------------------------|
//! | [`EntryId`]     | Opaque backend-assigned identity               |
//! | [`EntryKind`]   | File or Folder                                 |
//! | [`Hash`]        | Stored digest, or "must compute"               |
//! | [`Stat`]        | Backend-visible record of a single entry       |
//! | [`Properties`]  | Open driver-specific metadata                  |
//! | [`LoadState`]   | Folder materialization state                   |
//! |-----------------|------------------------------------------------|

pub mod ids;
pub mod name;
pub mod stat;

pub use ids::EntryId;
pub use name::{NameError, split_path, validate_name, DEFAULT_MAX_NAME_LEN, SEPARATOR};
pub use stat::{EntryKind, Hash, LoadState, Properties, Stat};
