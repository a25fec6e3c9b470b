use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cvault_store::testing::{make_chunks, TestStore};

fn bench_store(c: &mut Criterion) {
    let env = TestStore::new().unwrap();
    let chunks = make_chunks(env.store.hasher(), 1, 10 * 1024); // 10KB
    let (name, content) = &chunks[0];

    c.bench_function("chunkstore_store_delete_10kb", |b| {
        b.iter(|| {
            env.store.store(black_box(name.as_bytes()), black_box(content)).unwrap();
            env.store.delete_chunk(name.as_bytes()).unwrap();
        })
    });
}

fn bench_load(c: &mut Criterion) {
    let env = TestStore::new().unwrap();
    let (name, content) = make_chunks(env.store.hasher(), 1, 10 * 1024).remove(0);
    env.store.store(name.as_bytes(), &content).unwrap();

    c.bench_function("chunkstore_load_10kb", |b| {
        b.iter(|| env.store.load(black_box(name.as_bytes())).unwrap())
    });
}

fn bench_hash_check(c: &mut Criterion) {
    let env = TestStore::new().unwrap();
    let (name, content) = make_chunks(env.store.hasher(), 1, 1024 * 1024).remove(0); // 1MB
    env.store.store(name.as_bytes(), &content).unwrap();

    c.bench_function("chunkstore_hash_check_1mb", |b| {
        b.iter(|| env.store.hash_check_chunk(black_box(name.as_bytes())).unwrap())
    });
}

criterion_group!(benches, bench_store, bench_load, bench_hash_check);
criterion_main!(benches);
