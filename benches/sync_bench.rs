use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lazy_static::lazy_static;
use std::hint::black_box;
use std::time::Duration;
use tariff_sync::logic::{AdditionalRate, compute_total_rate, extract_hts_codes};
use tariff_sync::utils::{RateLimitPolicy, RateLimiter, TtlCache};

lazy_static! {
    static ref ADDITIONAL_RATES: Vec<AdditionalRate> = (0..32)
        .map(|i| {
            if i % 4 == 0 {
                AdditionalRate::new("surcharge", "see note")
            } else {
                AdditionalRate::new("section_301", format!("{}.5%", i).as_str())
            }
        })
        .collect();
    static ref NOTICE_TEXT: String = (0..200)
        .map(|i| format!("Heading {:04}.{:02}.{:04} is amended. ", 8400 + i % 99, i % 100, i))
        .collect();
}

fn cache_fill_and_read(entries: usize) {
    let cache = TtlCache::new(Duration::from_secs(3_600));
    for i in 0..entries {
        cache.set(format!("general_rates:/rates/{}", i), i, None);
    }
    for i in 0..entries {
        black_box(cache.get(&format!("general_rates:/rates/{}", i)));
    }
}

fn benchmark_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    group.sample_size(10);

    for entries in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("fill_and_read", entries), &entries, |b, &entries| {
            b.iter(|| cache_fill_and_read(entries))
        });
    }
    group.finish();
}

fn benchmark_rates(c: &mut Criterion) {
    let mut group = c.benchmark_group("rates");

    group.bench_function("compute_total_rate", |b| {
        b.iter(|| compute_total_rate(black_box(2.5), black_box(&ADDITIONAL_RATES)))
    });
    group.bench_function("extract_hts_codes", |b| b.iter(|| extract_hts_codes(black_box(&NOTICE_TEXT))));
    group.finish();
}

fn benchmark_rate_limiter(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("rate_limiter");

    group.bench_function("throttle_under_budget", |b| {
        b.to_async(&runtime).iter(|| async {
            let limiter = RateLimiter::new(
                RateLimitPolicy::new(Duration::from_secs(60), 1_000),
                Duration::from_millis(50),
            );
            for _ in 0..100 {
                limiter.throttle("general_rates").await;
            }
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_cache, benchmark_rates, benchmark_rate_limiter);
criterion_main!(benches);
