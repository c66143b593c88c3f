//! Driver behaviour under concurrent callers.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use tansu_kernel::{EntryHandle, ErrorKind};

use common::memory_driver;

#[test]
fn racing_creates_of_one_name_yield_one_winner() {
    let (fs, _) = memory_driver();
    let root = fs.root().unwrap();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let root = root.clone();
                s.spawn(move || root.create_file("lock", format!("{i}").as_bytes()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::NameConflict);
    }
    assert_eq!(root.children().unwrap().len(), 1);
}

#[test]
fn distinct_creates_all_land() {
    let (fs, _) = memory_driver();
    let root = fs.root().unwrap();
    let inbox = root.create_folder("inbox", false).unwrap();

    thread::scope(|s| {
        for t in 0..4 {
            let inbox = inbox.clone();
            s.spawn(move || {
                for i in 0..25 {
                    inbox.create_file(&format!("t{t}-{i}"), b"x").unwrap();
                }
            });
        }
    });

    assert_eq!(inbox.children().unwrap().len(), 100);
    assert_eq!(inbox.size().unwrap(), 100);
}

#[test]
fn readers_never_see_a_half_renamed_entry() {
    let (fs, _) = memory_driver();
    let root = fs.root().unwrap();
    let dir = root.create_folder("dir", false).unwrap();
    let file = dir.create_file("a", b"payload").unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                let name = if i % 2 == 0 { "b" } else { "a" };
                file.rename(name, false).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..3 {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let children = dir.children().unwrap();
                    assert_eq!(children.len(), 1);
                    let name = file.name().unwrap();
                    assert!(name == "a" || name == "b", "saw {name}");
                    assert_eq!(file.content().unwrap(), b"payload");
                }
            });
        }
    });

    assert_eq!(file.name().unwrap(), "a");
}

#[test]
fn root_loads_once_under_contention() {
    let (fs, store) = memory_driver();
    store.seed_file("docs/a.txt", b"a").unwrap();
    let root_loads = Arc::new(AtomicUsize::new(0));
    let scans = Arc::new(AtomicUsize::new(0));

    let counter = root_loads.clone();
    fs.register_folder_loaded_handler(None, move |folder| {
        if folder.is_root() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let counter = scans.clone();
    fs.register_folder_scanned_handler(None, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let entry = fs.entry_by_path("/docs/a.txt").unwrap();
                assert!(entry.is_some());
            });
        }
    });

    assert_eq!(root_loads.load(Ordering::SeqCst), 1);
    // root and docs, each once
    assert_eq!(scans.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_moves_keep_the_graph_acyclic() {
    let (fs, _) = memory_driver();
    let root = fs.root().unwrap();
    let a = root.create_folder("a", false).unwrap();
    let b = root.create_folder("b", false).unwrap();

    // Each thread tries to put one folder inside the other.
    let (ab, ba) = thread::scope(|s| {
        let ab = s.spawn(|| a.move_to(&b, None, false));
        let ba = s.spawn(|| b.move_to(&a, None, false));
        (ab.join().unwrap(), ba.join().unwrap())
    });

    assert!(ab.is_ok() ^ ba.is_ok());
    let failed = if ab.is_ok() { ba } else { ab };
    assert_eq!(failed.unwrap_err().kind(), ErrorKind::InvalidTarget);

    let a_parents = a.parents().unwrap();
    let b_parents = b.parents().unwrap();
    assert!(!(a_parents.contains(&b) && b_parents.contains(&a)));
}
