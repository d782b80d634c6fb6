use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use leaderboard_ledger::ranking::{rank, RankingKey, SortOrder};
use leaderboard_ledger::storage::{InMemoryStore, LedgerStorage};
use leaderboard_ledger::{CredentialParams, Ledger, LedgerConfig, Storefront};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn storefronts(count: usize) -> Vec<Storefront> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            Storefront::seeded(
                format!("store{i}"),
                format!("Store {i}"),
                format!("store{i}@example.com"),
                format!("https://store{i}.example"),
                Decimal::from((i * 7919) % 100_000),
                (i % 500) as u64,
                now - chrono::Duration::days((i % 365) as i64),
            )
        })
        .collect()
}

fn benchmark_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");
    let now = Utc::now();

    for count in [10, 1_000, 10_000].iter() {
        let input = storefronts(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| black_box(rank(input, RankingKey::GrowthRate, SortOrder::Desc, now).len()));
        });
    }

    group.finish();
}

fn benchmark_record_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = LedgerConfig {
        credentials: CredentialParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        ..LedgerConfig::default()
    };

    c.bench_function("ledger_1000_transactions", |b| {
        b.to_async(&rt).iter(|| async {
            let storage: Arc<dyn LedgerStorage> = Arc::new(InMemoryStore::new());
            let ledger = Ledger::open(storage, &config).await.unwrap();
            let seeds = storefronts(100);
            let ids: Vec<_> = seeds.iter().map(|s| s.id.clone()).collect();
            ledger.seed_storefronts(seeds).await.unwrap();

            for i in 0..1000 {
                let _ = ledger.record_transaction(&ids[i % ids.len()], dec!(1.0)).await;
            }

            black_box(ledger.summary().await.unwrap().total_orders)
        });
    });
}

criterion_group!(benches, benchmark_ranking, benchmark_record_throughput);
criterion_main!(benches);
