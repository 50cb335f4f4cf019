//! Criterion micro-benchmarks for the image-flag codec.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use dlext_core::image::{pack, unpack, unpack_all, unwrap_position};
use dlext_core::ImageInt;

/// 10K packed image flags cycling through small offsets.
fn make_images(n: usize) -> Vec<ImageInt> {
    (0..n)
        .map(|i| {
            let i = i as ImageInt;
            pack(i % 7 - 3, i % 5 - 2, i % 3 - 1).unwrap()
        })
        .collect()
}

/// Benchmark: pack 10K offset triples.
fn bench_pack(c: &mut Criterion) {
    c.bench_function("image_pack_10k", |b| {
        b.iter(|| {
            for i in 0..10_000 as ImageInt {
                black_box(pack(black_box(i % 7 - 3), 0, 1).unwrap());
            }
        });
    });
}

/// Benchmark: unpack 10K flags one at a time.
fn bench_unpack(c: &mut Criterion) {
    let images = make_images(10_000);
    c.bench_function("image_unpack_10k", |b| {
        b.iter(|| {
            for &img in &images {
                black_box(unpack(black_box(img)));
            }
        });
    });
}

/// Benchmark: bulk unpack of 10K flags.
fn bench_unpack_all(c: &mut Criterion) {
    let images = make_images(10_000);
    c.bench_function("image_unpack_all_10k", |b| {
        b.iter(|| black_box(unpack_all(black_box(&images))));
    });
}

/// Benchmark: unwrap 10K positions through their image flags.
fn bench_unwrap(c: &mut Criterion) {
    let images = make_images(10_000);
    c.bench_function("image_unwrap_10k", |b| {
        b.iter(|| {
            for (i, &img) in images.iter().enumerate() {
                let x = i as f64 * 1e-3;
                black_box(unwrap_position([x, x, x], img, [10.0, 12.0, 14.0]));
            }
        });
    });
}

criterion_group!(benches, bench_pack, bench_unpack, bench_unpack_all, bench_unwrap);
criterion_main!(benches);
