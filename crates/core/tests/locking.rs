use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;
use xqdb_core::{
    CollectionUri, Document, DocumentSet, LockError, LockMode, LockOptions, Permission, ResourceType, Store,
};

fn store_with(options: LockOptions, count: usize) -> (Arc<Store>, Vec<Arc<Document>>) {
    let store = Arc::new(Store::new(options));
    store.create_collection(&CollectionUri::parse("/db/locks").unwrap(), Permission::new("admin", "dba", 0o755));
    let docs = (0..count)
        .map(|i| {
            store
                .store_document(&format!("/db/locks/{i}.xml"), ResourceType::Xml, Permission::new("admin", "dba", 0o644))
                .unwrap()
        })
        .collect();
    (store, docs)
}

fn pick(docs: &[Arc<Document>], positions: &[usize]) -> DocumentSet {
    positions.iter().map(|&i| Arc::clone(&docs[i])).collect()
}

#[rstest]
fn overlapping_write_sets_never_deadlock() {
    let (_store, docs) = store_with(LockOptions::default(), 4);
    // Insertion order differs from id order on purpose.
    let first = pick(&docs, &[2, 0, 1]);
    let second = pick(&docs, &[3, 1, 2]);
    let inside = Arc::new(AtomicUsize::new(0));
    let rounds = 200;

    let workers: Vec<_> = [first, second]
        .into_iter()
        .map(|set| {
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                for _ in 0..rounds {
                    let guard = set.lock(LockMode::Write).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "overlapping sets held at once");
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    guard.unlock().unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(docs.iter().all(|d| !d.update_lock().is_locked_for_write()));
}

#[rstest]
fn failed_acquisition_rolls_back() {
    let options = LockOptions { timeout: Some(Duration::from_millis(50)), ..LockOptions::default() };
    let (_store, docs) = store_with(options, 4);
    let blocker = pick(&docs, &[2]);
    let all = pick(&docs, &[3, 2, 1, 0]);

    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let holder = thread::spawn(move || {
        let guard = blocker.lock(LockMode::Write).unwrap();
        held_tx.send(()).unwrap();
        done_rx.recv().unwrap();
        drop(guard);
    });
    held_rx.recv().unwrap();

    let err = all.lock(LockMode::Read).unwrap_err();
    assert!(matches!(err, LockError::Timeout { mode: LockMode::Read, .. }));
    assert_eq!(err.document(), docs[2].id());
    for doc in &docs {
        assert!(!doc.update_lock().is_held_by_current_thread(LockMode::Read), "{doc} still locked");
    }

    done_tx.send(()).unwrap();
    holder.join().unwrap();
    let guard = all.lock(LockMode::Read).unwrap();
    assert_eq!(guard.len(), 4);
}

#[rstest]
fn readers_share_writers_exclude() {
    let (_store, docs) = store_with(LockOptions::default(), 2);
    let set = Arc::new(pick(&docs, &[0, 1]));
    let barrier = Arc::new(Barrier::new(3));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let guard = set.lock(LockMode::Read).unwrap();
                barrier.wait();
                barrier.wait();
                drop(guard);
            })
        })
        .collect();

    barrier.wait();
    assert!(docs.iter().all(|d| d.update_lock().reader_count() == 2));
    assert!(docs.iter().all(|d| !d.update_lock().is_locked_for_write()));
    barrier.wait();
    for reader in readers {
        reader.join().unwrap();
    }

    let writer = set.lock(LockMode::Write).unwrap();
    assert!(docs.iter().all(|d| d.update_lock().is_held_by_current_thread(LockMode::Write)));
    drop(writer);
    assert!(docs.iter().all(|d| d.update_lock().reader_count() == 0));
}

#[rstest]
fn empty_set_locks_trivially() {
    let guard = DocumentSet::empty().lock(LockMode::Write).unwrap();
    assert!(guard.is_empty());
    assert_eq!(guard.mode(), LockMode::Write);
    guard.unlock().unwrap();
}
