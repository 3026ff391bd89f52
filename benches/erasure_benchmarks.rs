/// Benchmarks for Reed-Solomon split/encode/reconstruct/join across a range
/// of file sizes and shard counts.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use meshvault::erasure::ErasureCoder;

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("erasure_encode");

    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let coder = ErasureCoder::new(4, 2).unwrap();
        let data = vec![0x5au8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("split_and_encode", size), &data, |b, data| {
            b.iter(|| {
                let shards = coder.split(data);
                black_box(coder.encode(&shards).unwrap());
            });
        });
    }
    group.finish();
}

fn benchmark_reconstruct(c: &mut Criterion) {
    let mut group = c.benchmark_group("erasure_reconstruct");

    for size in [64 * 1024usize, 1024 * 1024] {
        let coder = ErasureCoder::new(4, 2).unwrap();
        let data = vec![0x5au8; size];
        let data_shards = coder.split(&data);
        let parity_shards = coder.encode(&data_shards).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("reconstruct_missing_two", size), |b| {
            b.iter(|| {
                let mut slots: Vec<Option<Vec<u8>>> = data_shards
                    .iter()
                    .chain(parity_shards.iter())
                    .cloned()
                    .map(Some)
                    .collect();
                slots[0] = None;
                slots[1] = None;
                coder.reconstruct(&mut slots).unwrap();
                black_box(&slots);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_reconstruct);
criterion_main!(benches);
