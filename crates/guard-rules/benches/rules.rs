//! Benchmarks for rule evaluation.

use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use guard_core::types::{PositionSnapshot, TradeOutcome, UserId};
use guard_rules::RuleSet;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn generate_positions(count: usize, opened_at: DateTime<Utc>) -> Vec<PositionSnapshot> {
    (0..count)
        .map(|i| {
            let mark = dec!(100) + Decimal::from(i as u64 % 50);
            PositionSnapshot::new(format!("SYM{}", i), dec!(2), dec!(100), mark, dec!(10), opened_at)
                .with_liquidation_price(mark * dec!(0.96))
                .with_account_equity(dec!(5000))
        })
        .collect()
}

fn benchmark_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("RuleSet::evaluate");
    let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    let rules = RuleSet::default();
    let outcomes: Vec<TradeOutcome> = (0..10)
        .map(|i| TradeOutcome::new(format!("SYM{}", i), dec!(-5), t0 - Duration::minutes(i)))
        .collect();

    for size in [10, 100, 1000].iter() {
        let positions = generate_positions(*size, t0);
        let ctx = rules.context(UserId(1), t0 + Duration::minutes(5), &outcomes);

        group.bench_with_input(BenchmarkId::new("positions", size), &positions, |b, positions| {
            b.iter(|| {
                positions
                    .iter()
                    .map(|p| rules.evaluate(black_box(p), &ctx).len())
                    .sum::<usize>()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_evaluate);
criterion_main!(benches);
