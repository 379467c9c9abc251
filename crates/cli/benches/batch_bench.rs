use batch::WriteBatch;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use memtable::MemTable;

const OPS_PER_BATCH: usize = 100;
const VALUE_SIZE: usize = 100;

fn build_batch() -> WriteBatch {
    let mut b = WriteBatch::new();
    let value = vec![b'v'; VALUE_SIZE];
    for i in 0..OPS_PER_BATCH {
        let key = format!("key{}", i);
        if i % 10 == 0 {
            b.delete(key.as_bytes());
        } else {
            b.put(key.as_bytes(), &value);
        }
    }
    b.set_sequence(1);
    b
}

fn batch_build_benchmark(c: &mut Criterion) {
    c.bench_function("batch_build_100", |b| b.iter(|| black_box(build_batch())));
}

fn batch_iterate_benchmark(c: &mut Criterion) {
    let batch = build_batch();
    c.bench_function("batch_iterate_100", |b| {
        b.iter(|| {
            let mut bytes = 0;
            batch.iterate(|op| bytes += op.key().len()).unwrap();
            black_box(bytes)
        });
    });
}

fn batch_insert_benchmark(c: &mut Criterion) {
    let batch = build_batch();
    c.bench_function("batch_insert_into_memtable_100", |b| {
        b.iter_batched(
            MemTable::new,
            |mem| {
                batch.insert_into(&mem).unwrap();
                mem
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    batch_build_benchmark,
    batch_iterate_benchmark,
    batch_insert_benchmark
);
criterion_main!(benches);
