/// Benchmarks for the per-shard crypto primitives: AES-128-GCM
/// encrypt/decrypt, gzip compress/decompress, and ECDSA sign/verify, across
/// a range of shard sizes.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use meshvault::crypto;

fn benchmark_gcm(c: &mut Criterion) {
    let mut group = c.benchmark_group("aes_gcm");
    let key = crypto::derive_gcm_key(&crypto::generate_file_secret());

    for size in [1024usize, 64 * 1024, 1024 * 1024, 4 * 1024 * 1024] {
        let data = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &data, |b, data| {
            b.iter(|| black_box(crypto::gcm_encrypt(&key, data).unwrap()));
        });

        let sealed = crypto::gcm_encrypt(&key, &data).unwrap();
        group.bench_with_input(BenchmarkId::new("decrypt", size), &sealed, |b, sealed| {
            b.iter(|| black_box(crypto::gcm_decrypt(&key, sealed).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_gzip(c: &mut Criterion) {
    let mut group = c.benchmark_group("gzip");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let data = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("compress", size), &data, |b, data| {
            b.iter(|| black_box(crypto::gzip_compress(data).unwrap()));
        });

        let compressed = crypto::gzip_compress(&data).unwrap();
        group.bench_with_input(BenchmarkId::new("decompress", size), &compressed, |b, compressed| {
            b.iter(|| black_box(crypto::gzip_decompress(compressed).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("ecdsa");
    let (secret, public) = crypto::generate_signing_key();
    let payload = vec![0x11u8; 256];

    group.bench_function("sign", |b| {
        b.iter(|| black_box(crypto::sign(&secret, &payload)));
    });

    let signature = crypto::sign(&secret, &payload);
    group.bench_function("verify", |b| {
        b.iter(|| black_box(crypto::verify(&public, &payload, &signature)));
    });
    group.finish();
}

fn benchmark_shamir(c: &mut Criterion) {
    let mut group = c.benchmark_group("shamir");
    let secret = crypto::generate_file_secret();

    group.bench_function("split_3_2", |b| {
        b.iter(|| black_box(crypto::shamir_split(&secret, 3, 2).unwrap()));
    });

    let shares = crypto::shamir_split(&secret, 3, 2).unwrap();
    group.bench_function("combine_2_of_3", |b| {
        b.iter(|| black_box(crypto::shamir_combine(&shares[0..2], 2).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, benchmark_gcm, benchmark_gzip, benchmark_signing, benchmark_shamir);
criterion_main!(benches);
