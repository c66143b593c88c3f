//! Shared fixtures for driver integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tansu_kernel::backend::{Backend, BackendError, BackendResult, Link, MemoryBackend};
use tansu_kernel::{Driver, EntryId, File, FsError, FsResult, Stat};

/// Install a test subscriber once. `RUST_LOG=tansu_kernel=debug` shows driver logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Memory backend that fails on demand.
pub struct FlakyBackend {
    inner: Arc<MemoryBackend>,
    failing_unlinks: Mutex<HashSet<EntryId>>,
    failing_lists: Mutex<HashSet<EntryId>>,
    list_calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            failing_unlinks: Mutex::new(HashSet::new()),
            failing_lists: Mutex::new(HashSet::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Make every unlink of `entry` fail.
    pub fn fail_unlink(&self, entry: &EntryId) {
        self.failing_unlinks.lock().insert(entry.clone());
    }

    /// Make listing `folder` fail.
    pub fn fail_list(&self, folder: &EntryId) {
        self.failing_lists.lock().insert(folder.clone());
    }

    pub fn heal(&self) {
        self.failing_unlinks.lock().clear();
        self.failing_lists.lock().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Backend for FlakyBackend {
    fn label(&self) -> &str {
        "flaky"
    }

    fn root(&self) -> BackendResult<Stat> {
        self.inner.root()
    }

    fn list(&self, folder: &EntryId) -> BackendResult<Vec<Stat>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_lists.lock().contains(folder) {
            return Err(BackendError::other("listing refused"));
        }
        self.inner.list(folder)
    }

    fn read(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Vec<u8>> {
        self.inner.read(file, offset, len)
    }

    fn open(&self, file: &EntryId, offset: u64, len: u64) -> BackendResult<Box<dyn Read + Send>> {
        self.inner.open(file, offset, len)
    }

    fn create_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> BackendResult<Stat> {
        self.inner.create_file(parent, name, data)
    }

    fn create_folder(&self, parent: &EntryId, name: &str) -> BackendResult<Stat> {
        self.inner.create_folder(parent, name)
    }

    fn link(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        self.inner.link(entry, parent, name)
    }

    fn unlink(&self, entry: &EntryId, parent: &EntryId, name: &str) -> BackendResult<()> {
        if self.failing_unlinks.lock().contains(entry) {
            return Err(BackendError::other("file is locked"));
        }
        self.inner.unlink(entry, parent, name)
    }

    fn rename(&self, entry: &EntryId, links: &[Link], new_name: &str) -> BackendResult<Stat> {
        self.inner.rename(entry, links, new_name)
    }

    fn relocate(
        &self,
        entry: &EntryId,
        links: &[Link],
        to: &EntryId,
        new_name: &str,
    ) -> BackendResult<Stat> {
        self.inner.relocate(entry, links, to, new_name)
    }

    fn set_times(
        &self,
        entry: &EntryId,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()> {
        self.inner.set_times(entry, created, modified)
    }
}

/// Memory-backed driver plus the store behind it, for seeding.
pub fn memory_driver() -> (Driver, Arc<MemoryBackend>) {
    init_tracing();
    let store = Arc::new(MemoryBackend::new());
    let driver = Driver::mount(store.clone()).unwrap();
    (driver, store)
}

/// Driver over a [`FlakyBackend`].
pub fn flaky_driver() -> (Driver, Arc<MemoryBackend>, Arc<FlakyBackend>) {
    init_tracing();
    let store = Arc::new(MemoryBackend::new());
    let flaky = Arc::new(FlakyBackend::new(store.clone()));
    let driver = Driver::mount(flaky.clone()).unwrap();
    (driver, store, flaky)
}

/// Hash function that returns a fixed digest and counts its calls.
pub fn counting_hasher(
    digest: &'static str,
) -> (
    impl Fn(&File) -> FsResult<String> + Send + Sync + 'static,
    Arc<AtomicUsize>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let hasher = move |_: &File| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, FsError>(digest.to_string())
    };
    (hasher, calls)
}
