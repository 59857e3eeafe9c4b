//! Benchmarks for the response cache and key derivation

use ai_lib_exec::cache::{CacheEntry, CacheKeyGenerator, ResponseCache};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::Duration;

fn bench_key_generation(c: &mut Criterion) {
    let keys = CacheKeyGenerator::new();
    let body = json!({
        "model": "gpt-4o",
        "temperature": 0.2,
        "messages": [
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "Summarise the plot of Hamlet in one line."}
        ],
        "max_tokens": 64
    });

    c.bench_function("cache_key_from_json", |b| {
        b.iter(|| keys.generate_from_json(black_box(&body)))
    });
}

fn bench_get_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");
    let keys = CacheKeyGenerator::new();

    for size in [100usize, 1000, 10_000] {
        let cache = ResponseCache::new(size, Duration::from_secs(3600));
        let hashed: Vec<_> = (0..size)
            .map(|i| keys.generate(&format!(r#"{{"i":{}}}"#, i)))
            .collect();
        for k in &hashed {
            cache.put(k.clone(), CacheEntry::new(r#"{"ok":true}"#, 200));
        }

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % hashed.len();
                black_box(cache.get(&hashed[i]))
            })
        });

        group.bench_with_input(BenchmarkId::new("put_evicting", size), &size, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i += 1;
                let key = keys.generate(&format!(r#"{{"new":{}}}"#, i));
                cache.put(key, CacheEntry::new("{}", 200))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_key_generation, bench_get_put);
criterion_main!(benches);
