use scchain_storage::{
    backends::hashmap::Backend,
    storage::{Storage, WriteBatch},
};

#[test]
fn write_batch_applies_in_order() {
    let storage = Backend::new();
    storage.put(b"stale".to_vec(), b"x".to_vec()).unwrap();

    // A key put and then deleted in the same batch must not survive
    let mut batch = WriteBatch::default();
    batch.put(b"block-1".to_vec(), b"one".to_vec());
    batch.put(b"tmp".to_vec(), b"y".to_vec());
    batch.delete(b"tmp".to_vec());
    batch.delete(b"stale".to_vec());
    assert!(!batch.is_empty());
    storage.write(batch).unwrap();

    assert_eq!(storage.get(b"block-1").unwrap(), Some(b"one".to_vec()));
    assert_eq!(storage.get(b"tmp").unwrap(), None);
    assert_eq!(storage.get(b"stale").unwrap(), None);
}

#[test]
fn backend_is_shareable_between_threads() {
    use std::sync::Arc;

    let storage: Arc<dyn Storage> = Arc::new(Backend::new());
    let handles: Vec<_> = (0..4u8)
        .map(|i| {
            let storage = Arc::clone(&storage);
            std::thread::spawn(move || storage.put(vec![i], vec![i]).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(storage.prefix_iterator(b"").unwrap().count(), 4);
}
