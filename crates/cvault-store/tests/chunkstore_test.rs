use std::fs;
use std::sync::Arc;
use std::thread;

use cvault_store::testing::{check_file_path, find_file, make_chunks, TestStore};
use cvault_store::{ChunkName, ChunkStore, ChunkType, OutgoingStatus, StoreError, StoreOptions};

#[test]
fn test_store_load_roundtrip() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    for (name, content) in make_chunks(store.hasher(), 20, 1024) {
        store.store(name.as_bytes(), &content).unwrap();
        assert!(store.has(name.as_bytes()));
        assert_eq!(store.load(name.as_bytes()).unwrap(), content);
        assert_eq!(store.chunk_size(name.as_bytes()), Some(1024));
        assert!(check_file_path(&env.root, &name, ChunkType::HASHABLE_NORMAL));
    }
    assert_eq!(store.chunk_count(), 20);
    assert_eq!(store.count_by_type(ChunkType::HASHABLE_NORMAL), 20);
}

#[test]
fn test_store_file_and_empty_content() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let source = env.root.join("source.bin");
    fs::write(&source, b"from a file").unwrap();
    let name = store.hasher().digest(b"from a file");
    store.store_file(&name, &source).unwrap();
    assert_eq!(store.load(&name).unwrap(), b"from a file");

    let empty = store.hasher().digest(b"");
    store.store(&empty, b"").unwrap();
    assert_eq!(store.load(&empty).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_key_size_is_enforced() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let short = vec![1u8; store.key_size() - 1];
    let long = vec![1u8; store.key_size() + 1];

    for bad in [&short[..], &long[..], &[0u8; 0][..]] {
        assert!(matches!(
            store.store(bad, b"x"),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(matches!(store.load(bad), Err(StoreError::IncorrectKeySize { .. })));
        assert!(matches!(
            store.delete_chunk(bad),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(matches!(
            store.add_chunk_to_outgoing(bad, b"x"),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(matches!(
            store.hash_check_chunk(bad),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(matches!(
            store.change_chunk_type(bad, ChunkType::HASHABLE_CACHE),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(matches!(
            store.promote_to_normal(bad),
            Err(StoreError::IncorrectKeySize { .. })
        ));
        assert!(!store.has(bad));
    }
    assert_eq!(store.chunk_count(), 0);
}

#[test]
fn test_no_blind_overwrite_of_normal_chunk() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 64).remove(0);
    store.store(name.as_bytes(), &content).unwrap();

    assert!(matches!(
        store.store(name.as_bytes(), b"different"),
        Err(StoreError::InvalidChunkType)
    ));
    assert_eq!(store.load(name.as_bytes()).unwrap(), content);
}

#[test]
fn test_store_promotes_non_normal_chunks() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let chunks = make_chunks(store.hasher(), 3, 64);
    let lifecycles = [
        ChunkType::HASHABLE_OUTGOING,
        ChunkType::HASHABLE_CACHE,
        ChunkType::HASHABLE_TEMP_CACHE,
    ];

    for ((name, content), ty) in chunks.iter().zip(lifecycles) {
        store.store(name.as_bytes(), content).unwrap();
        store.change_chunk_type(name.as_bytes(), ty).unwrap();
        assert!(check_file_path(&env.root, name, ty));

        store.store(name.as_bytes(), content).unwrap();
        assert_eq!(store.chunk_type(name.as_bytes()), Some(ChunkType::HASHABLE_NORMAL));
        assert!(check_file_path(&env.root, name, ChunkType::HASHABLE_NORMAL));
        assert!(!check_file_path(&env.root, name, ty));
    }
}

#[test]
fn test_add_chunk_to_outgoing() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 64).remove(0);

    assert_eq!(
        store.add_chunk_to_outgoing(name.as_bytes(), &content).unwrap(),
        OutgoingStatus::Added
    );
    assert_eq!(store.chunk_type(name.as_bytes()), Some(ChunkType::HASHABLE_OUTGOING));
    assert!(check_file_path(&env.root, &name, ChunkType::HASHABLE_OUTGOING));

    assert_eq!(
        store.add_chunk_to_outgoing(name.as_bytes(), b"ignored").unwrap(),
        OutgoingStatus::AlreadyPresent
    );
    assert_eq!(store.load(name.as_bytes()).unwrap(), content);

    // Present under another type still counts
    let (other, other_content) = make_chunks(store.hasher(), 1, 64).remove(0);
    store.store(other.as_bytes(), &other_content).unwrap();
    assert_eq!(
        store.add_chunk_to_outgoing(other.as_bytes(), &other_content).unwrap(),
        OutgoingStatus::AlreadyPresent
    );
    assert_eq!(store.chunk_type(other.as_bytes()), Some(ChunkType::HASHABLE_NORMAL));
}

#[test]
fn test_load_errors() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 64).remove(0);

    assert!(matches!(store.load(name.as_bytes()), Err(StoreError::InvalidChunkType)));

    store.store(name.as_bytes(), &content).unwrap();
    fs::remove_file(store.chunk_path(name.as_bytes()).unwrap()).unwrap();
    match store.load(name.as_bytes()) {
        Err(StoreError::NotFound { name: missing }) => assert_eq!(missing, name),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_delete_is_idempotent() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 64).remove(0);

    store.delete_chunk(name.as_bytes()).unwrap();

    store.store(name.as_bytes(), &content).unwrap();
    let path = store.chunk_path(name.as_bytes()).unwrap();
    store.delete_chunk(name.as_bytes()).unwrap();
    assert!(!path.exists());
    assert!(!store.has(name.as_bytes()));
    store.delete_chunk(name.as_bytes()).unwrap();
    assert_eq!(store.chunk_count(), 0);
}

#[test]
fn test_change_chunk_type_over_all_types() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 300).remove(0);
    store.store(name.as_bytes(), &content).unwrap();

    for ty in ChunkType::ALL {
        store.change_chunk_type(name.as_bytes(), ty).unwrap();
        assert_eq!(store.chunk_type(name.as_bytes()), Some(ty));
        assert!(check_file_path(&env.root, &name, ty), "{}", ty);
        assert_eq!(store.load(name.as_bytes()).unwrap(), content);
        assert_eq!(store.count_by_type(ty), 1);

        // Exactly one copy on disk
        let found = find_file(&env.root, &name.to_hex()).unwrap();
        assert_eq!(found, store.chunk_path(name.as_bytes()).unwrap());
    }

    // Same type is a no-op
    let last = *ChunkType::ALL.last().unwrap();
    store.change_chunk_type(name.as_bytes(), last).unwrap();
    assert_eq!(store.chunk_type(name.as_bytes()), Some(last));
}

#[test]
fn test_change_chunk_type_unknown_chunk() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let name = vec![7u8; store.key_size()];
    assert!(matches!(
        store.change_chunk_type(&name, ChunkType::HASHABLE_CACHE),
        Err(StoreError::ChunkStore(_))
    ));
}

#[test]
fn test_failed_type_change_keeps_catalogue() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let (name, content) = make_chunks(store.hasher(), 1, 64).remove(0);
    store.store(name.as_bytes(), &content).unwrap();

    let path = store.chunk_path(name.as_bytes()).unwrap();
    fs::remove_file(&path).unwrap();

    assert!(matches!(
        store.change_chunk_type(name.as_bytes(), ChunkType::HASHABLE_CACHE),
        Err(StoreError::Io(_))
    ));
    assert_eq!(store.chunk_type(name.as_bytes()), Some(ChunkType::HASHABLE_NORMAL));
    assert_eq!(store.chunk_size(name.as_bytes()), Some(64));
    assert_eq!(store.count_by_type(ChunkType::HASHABLE_CACHE), 0);
    assert!(!check_file_path(&env.root, &name, ChunkType::HASHABLE_CACHE));
}

#[test]
fn test_hash_check_chunk() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let chunks = make_chunks(store.hasher(), 2, 128);
    let (good, good_content) = &chunks[0];
    let (bad, bad_content) = &chunks[1];
    store.store(good.as_bytes(), good_content).unwrap();
    store.store(bad.as_bytes(), bad_content).unwrap();

    store.hash_check_chunk(good.as_bytes()).unwrap();

    fs::write(store.chunk_path(bad.as_bytes()).unwrap(), b"tampered").unwrap();
    match store.hash_check_chunk(bad.as_bytes()) {
        Err(StoreError::HashCheckFailure { names }) => assert_eq!(names, vec![bad.clone()]),
        other => panic!("expected HashCheckFailure, got {:?}", other),
    }

    // Unknown chunk
    let unknown = vec![3u8; store.key_size()];
    assert!(matches!(
        store.hash_check_chunk(&unknown),
        Err(StoreError::InvalidChunkType)
    ));

    // Non-hashable chunk
    store
        .change_chunk_type(good.as_bytes(), ChunkType::NON_HASHABLE_NORMAL)
        .unwrap();
    assert!(matches!(
        store.hash_check_chunk(good.as_bytes()),
        Err(StoreError::InvalidChunkType)
    ));
}

#[test]
fn test_hash_check_advances_last_checked_even_on_failure() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let chunks = make_chunks(store.hasher(), 2, 32);
    for (name, content) in &chunks {
        store.store(name.as_bytes(), content).unwrap();
    }
    let first = &chunks[0].0;
    assert_eq!(store.oldest_checked().unwrap().name, *first);
    let before = store.chunk_info(first.as_bytes()).unwrap().last_checked;

    fs::write(store.chunk_path(first.as_bytes()).unwrap(), b"corrupt").unwrap();
    assert!(store.hash_check_chunk(first.as_bytes()).is_err());

    let after = store.chunk_info(first.as_bytes()).unwrap().last_checked;
    assert!(after > before);
    assert_eq!(store.oldest_checked().unwrap().name, chunks[1].0);
}

#[test]
fn test_catalogue_rebuilt_after_restart() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let chunks = make_chunks(store.hasher(), 8, 100);
    for ((name, content), ty) in chunks.iter().zip(ChunkType::ALL) {
        store.store(name.as_bytes(), content).unwrap();
        store.change_chunk_type(name.as_bytes(), ty).unwrap();
    }

    // A stray temp file from an interrupted write must not be picked up
    let shard = store
        .chunk_path(chunks[0].0.as_bytes())
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    let temp_file = shard.join(format!("{}.999.tmp", chunks[0].0));
    fs::write(&temp_file, b"partial").unwrap();

    let reopened = env.reopen();
    reopened.init().unwrap();
    assert_eq!(reopened.chunk_count(), 8);
    assert!(!temp_file.exists());
    for ((name, content), ty) in chunks.iter().zip(ChunkType::ALL) {
        assert_eq!(reopened.chunk_type(name.as_bytes()), Some(ty));
        assert_eq!(reopened.chunk_size(name.as_bytes()), Some(100));
        assert_eq!(reopened.load(name.as_bytes()).unwrap(), *content);
    }
    assert_eq!(reopened.chunk_names(), store.chunk_names());
}

#[test]
fn test_verify_on_init_deletes_corrupt_chunks() {
    let env = TestStore::new().unwrap();
    let chunks = make_chunks(env.store.hasher(), 3, 64);
    for (name, content) in &chunks {
        env.store.store(name.as_bytes(), content).unwrap();
    }
    let corrupt = env.store.chunk_path(chunks[1].0.as_bytes()).unwrap();
    fs::write(&corrupt, b"bit rot").unwrap();

    let options = StoreOptions {
        verify_on_init: true,
        check_threads: Some(2),
        ..Default::default()
    };
    let reopened = ChunkStore::new(&env.root, options);
    reopened.init().unwrap();
    assert_eq!(reopened.chunk_count(), 2);
    assert!(!reopened.has(chunks[1].0.as_bytes()));
    assert!(!corrupt.exists());
}

#[test]
fn test_store_retype_check_delete_scenario() {
    let env = TestStore::new().unwrap();
    let store = &env.store;
    let content = b"scenario chunk content".to_vec();
    let name = ChunkName::from(store.hasher().digest(&content));

    store.store(name.as_bytes(), &content).unwrap();
    assert!(check_file_path(&env.root, &name, ChunkType::HASHABLE_NORMAL));

    store
        .change_chunk_type(name.as_bytes(), ChunkType::HASHABLE_CACHE)
        .unwrap();
    assert!(check_file_path(&env.root, &name, ChunkType::HASHABLE_CACHE));
    assert!(!check_file_path(&env.root, &name, ChunkType::HASHABLE_NORMAL));

    store.hash_check_chunk(name.as_bytes()).unwrap();

    store.delete_chunk(name.as_bytes()).unwrap();
    assert!(!store.has(name.as_bytes()));
    assert!(find_file(&env.root, &name.to_hex()).is_none());
}

#[test]
fn test_concurrent_disjoint_stores() {
    let env = TestStore::new().unwrap();
    let store = Arc::new(ChunkStore::new(&env.root, StoreOptions::default()));
    store.init().unwrap();

    let per_thread = 25;
    let batches: Vec<_> = (0..4)
        .map(|_| make_chunks(store.hasher(), per_thread, 256))
        .collect();

    let handles: Vec<_> = batches
        .clone()
        .into_iter()
        .map(|batch| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for (name, content) in batch {
                    store.store(name.as_bytes(), &content).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.chunk_count(), 4 * per_thread);
    for (name, content) in batches.into_iter().flatten() {
        assert_eq!(store.load(name.as_bytes()).unwrap(), content);
    }
}

#[test]
fn test_blake3_store() {
    let env = TestStore::with_options(StoreOptions {
        digest: cvault_store::DigestAlgorithm::Blake3,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(env.store.key_size(), 32);
    let (name, content) = make_chunks(env.store.hasher(), 1, 10).remove(0);
    env.store.store(name.as_bytes(), &content).unwrap();
    env.store.hash_check_chunk(name.as_bytes()).unwrap();
}
