//! Classifier hot-path benchmarks.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{Criterion, criterion_group, criterion_main};
use linkgate::routing::{Classifier, is_static_asset};

// ============== classify ==============

fn bench_classify_memoized(c: &mut Criterion) {
    let classifier = Classifier::new("slugy.co", 4096);
    // Warm the (host, path) memo so this measures the cache hit.
    classifier.classify("go.customer.com", "/promo");

    c.bench_function("classifier/classify_hit", |b| {
        b.iter(|| classifier.classify(black_box("go.customer.com"), black_box("/promo")));
    });
}

fn bench_classify_novel_host(c: &mut Criterion) {
    let classifier = Classifier::new("slugy.co", 1 << 20);
    let counter = AtomicU64::new(0);

    c.bench_function("classifier/classify_novel", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::Relaxed);
            classifier.classify(&format!("tenant{}.example.com", i), "/promo")
        });
    });
}

// ============== path and host helpers ==============

fn bench_static_asset_check(c: &mut Criterion) {
    c.bench_function("classifier/static_asset_hit", |b| {
        b.iter(|| is_static_asset(black_box("/_next/static/chunks/main-7c2ae9ab.js")));
    });

    c.bench_function("classifier/static_asset_miss", |b| {
        b.iter(|| is_static_asset(black_box("/summer-sale")));
    });
}

fn bench_canonical_host(c: &mut Criterion) {
    let classifier = Classifier::new("slugy.co", 4096);

    c.bench_function("classifier/canonical_host", |b| {
        b.iter(|| classifier.canonical_host(black_box("App.Slugy.Co:8443")));
    });
}

criterion_group!(
    benches,
    bench_classify_memoized,
    bench_classify_novel_host,
    bench_static_asset_check,
    bench_canonical_host
);
criterion_main!(benches);
