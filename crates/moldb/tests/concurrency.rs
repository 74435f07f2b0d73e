//! Readers running alongside a writer never observe a partial record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use bytes::Bytes;
use moldb::{Backend, Identifier};
use moldb_testkit::TempStore;

fn content(version: u8) -> Bytes {
    Bytes::from(vec![version; 4096])
}

fn readers_see_whole_records(backend: Backend) {
    let temp = TempStore::new(backend);
    let store = temp.store();
    let id = Identifier::new("InChI=1S/C6H6/c1-2-4-6-5-3-1/h1-6H").unwrap();
    store.put(&id, &content(0)).unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    let record = store.get(&id).unwrap().unwrap();
                    let first = record.content[0];
                    assert_eq!(record.content.len(), 4096);
                    assert!(record.content.iter().all(|&b| b == first));
                }
            });
        }

        for version in 1..=100u8 {
            store.put(&id, &content(version)).unwrap();
        }
        done.store(true, Ordering::Relaxed);
    });

    assert_eq!(store.get(&id).unwrap().unwrap().content, content(100));
}

#[test]
fn test_lmdb_readers_during_writes() {
    readers_see_whole_records(Backend::Lmdb);
}

#[test]
fn test_sqlite_readers_during_writes() {
    readers_see_whole_records(Backend::Sqlite);
}
