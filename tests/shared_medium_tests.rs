//! Several stores contending for one medium through the shared lock

use periodic_log::{BackingStore, ExclusiveLock, Medium, SharedMemory, StoreConfig};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

/// Stores in different threads write disjoint pages of one buffer
#[test]
fn test_concurrent_stores_on_one_medium() {
    let dir = tempdir().unwrap();
    let memory = SharedMemory::new(4 * 64);

    let handles: Vec<_> = (0..4u8)
        .map(|id| {
            let memory = memory.clone();
            let config = StoreConfig {
                page_size: 16,
                min_write_interval: Duration::from_millis(1),
                lock_dir: dir.path().to_path_buf(),
                ..StoreConfig::default()
            };
            thread::spawn(move || {
                let mut store = BackingStore::new(Medium::InMemory(memory), &config).unwrap();
                let base = id as usize * 64;
                for chunk in 0..8 {
                    store.write(base + chunk * 8, &[id + 1; 8], false).unwrap();
                }
                store.flush().unwrap();
                store.read(base, 64).unwrap()
            })
        })
        .collect();

    for (id, handle) in handles.into_iter().enumerate() {
        let read_back = handle.join().unwrap();
        assert_eq!(read_back, vec![id as u8 + 1; 64]);
    }

    let image = memory.to_vec();
    for (i, byte) in image.iter().enumerate() {
        assert_eq!(*byte as usize, i / 64 + 1);
    }
}

/// A held lock keeps a store's flush waiting until release
#[test]
fn test_flush_waits_for_lock_holder() {
    let dir = tempdir().unwrap();
    let memory = SharedMemory::new(32);
    let config = StoreConfig {
        page_size: 8,
        min_write_interval: Duration::ZERO,
        lock_dir: dir.path().to_path_buf(),
        lock_name: "held.lock".to_string(),
        ..StoreConfig::default()
    };

    let holder = ExclusiveLock::open(dir.path(), "held.lock").unwrap();
    let guard = holder.acquire().unwrap();

    let writer = {
        let memory = memory.clone();
        let config = config.clone();
        thread::spawn(move || {
            let mut store = BackingStore::new(Medium::InMemory(memory), &config).unwrap();
            store.write(0, &[5, 6, 7], true).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(memory.to_vec()[..3], [0, 0, 0]);

    guard.release();
    writer.join().unwrap();
    assert_eq!(memory.to_vec()[..3], [5, 6, 7]);
}
