//! accumulator and engine benchmarks
//!
//! Usage:
//!   cargo bench -p privax-relayer              # run all benchmarks
//!   cargo bench -p privax-relayer -- append    # tree appends only
//!   cargo bench -p privax-relayer -- path      # path extraction only

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use privax_relayer::{
    Blake3Hasher, DepositEvent, Digest, MemoryStore, MerkleAccumulator, RelayerEngine, Sha256Hasher,
};
use rand::Rng;

fn random_leaves(n: usize) -> Vec<Digest> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| Digest(rng.gen::<[u8; 32]>())).collect()
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for log_n in [10u32, 14, 16] {
        let leaves = random_leaves(1 << log_n);
        let label = format!("2^{}", log_n);

        group.bench_function(BenchmarkId::new("sha256", &label), |b| {
            b.iter(|| {
                let tree = MerkleAccumulator::from_leaves(Sha256Hasher, black_box(leaves.iter().copied()));
                black_box(tree.root())
            });
        });

        group.bench_function(BenchmarkId::new("blake3", &label), |b| {
            b.iter(|| {
                let tree = MerkleAccumulator::from_leaves(Blake3Hasher, black_box(leaves.iter().copied()));
                black_box(tree.root())
            });
        });
    }

    group.finish();
}

fn bench_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("path");

    let leaves = random_leaves(1 << 16);
    let tree = MerkleAccumulator::from_leaves(Sha256Hasher, leaves.iter().copied());
    let target = leaves[leaves.len() / 3];

    group.bench_function("path_for 2^16", |b| {
        b.iter(|| black_box(tree.path_for(black_box(&target)).unwrap()));
    });

    group.finish();
}

fn bench_record_deposit(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_deposit");
    group.sample_size(20);

    // memory store: measures the engine, not the disk
    let engine = RelayerEngine::open(Box::new(MemoryStore::new()), Sha256Hasher).unwrap();
    let leaves = random_leaves(1 << 10);
    for leaf in &leaves {
        engine
            .record_deposit(DepositEvent {
                depositor: "0xdepositor".into(),
                token: "0xtoken".into(),
                amount: 1,
                commitment: *leaf,
                timestamp: None,
            })
            .unwrap();
    }

    let mut rng = rand::thread_rng();
    group.bench_function("memory 2^10", |b| {
        b.iter(|| {
            let receipt = engine
                .record_deposit(DepositEvent {
                    depositor: "0xdepositor".into(),
                    token: "0xtoken".into(),
                    amount: 1,
                    commitment: Digest(rng.gen::<[u8; 32]>()),
                    timestamp: None,
                })
                .unwrap();
            black_box(receipt)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_path, bench_record_deposit);
criterion_main!(benches);
