//! Benchmarks for shardkv lookups

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use shardkv::{AliasTable, AliasTableWriter, BloomFilter, Config, JList, JListWriter};

fn entries(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("key-{:08}", i).into_bytes(),
                format!("value-{}", i).into_bytes(),
            )
        })
        .collect()
}

fn jlist_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("jlist_lookup");
    for n in [1_000usize, 100_000] {
        let data = entries(n);
        for (label, config) in [
            ("plain", Config::default()),
            ("bloom", Config::builder().jlist_bloom_fp_rate(Some(0.01)).build()),
        ] {
            let mut writer = JListWriter::with_config(n, &config).unwrap();
            for (k, v) in &data {
                writer.add_entry(k, v).unwrap();
            }
            let bytes = writer.finish().unwrap();
            let jlist = JList::open(&bytes).unwrap();

            group.bench_with_input(BenchmarkId::new(format!("hit/{}", label), n), &n, |b, &n| {
                let mut i = 0usize;
                b.iter(|| {
                    i = (i + 7919) % n;
                    black_box(jlist.lookup_key(&data[i].0).unwrap())
                })
            });
            group.bench_with_input(BenchmarkId::new(format!("miss/{}", label), n), &n, |b, _| {
                b.iter(|| black_box(jlist.lookup_key(b"key-zzzzzzzz").unwrap()))
            });
        }
    }
    group.finish();
}

fn alias_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("alias_lookup");
    for n in [1_000usize, 100_000] {
        let data = entries(n);
        let mut writer = AliasTableWriter::new(n).unwrap();
        for (k, v) in &data {
            writer.add_entry(k, v).unwrap();
        }
        let bytes = writer.finish().unwrap();
        let table = AliasTable::open(&bytes).unwrap();

        group.bench_with_input(BenchmarkId::new("hit", n), &n, |b, &n| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 7919) % n;
                black_box(table.find_entry(&data[i].0).unwrap())
            })
        });
        group.bench_with_input(BenchmarkId::new("miss", n), &n, |b, _| {
            b.iter(|| black_box(table.find_entry(b"absent-key").unwrap()))
        });
    }
    group.finish();
}

fn bloom_benchmarks(c: &mut Criterion) {
    let mut filter = BloomFilter::new_for_params(100_000, 0.01).unwrap();
    for (k, _) in entries(100_000) {
        filter.add(&k);
    }
    c.bench_function("bloom_contains", |b| {
        b.iter(|| black_box(filter.contains(b"key-00004242")))
    });
}

criterion_group!(benches, jlist_benchmarks, alias_benchmarks, bloom_benchmarks);
criterion_main!(benches);
