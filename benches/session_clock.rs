use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use market_collector::calendar::{ExchangeCalendar, TradingCalendar};
use market_collector::ingestion::normalize_batch;
use market_collector::provider::RawBar;
use market_collector::session::{ManualClock, SessionClock};

fn nyse() -> ExchangeCalendar {
    ExchangeCalendar::for_exchange(
        "XNYS",
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    )
    .unwrap()
}

fn bench_phase_classification(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    let clock = SessionClock::new(Arc::new(nyse()), TimeDelta::minutes(60), Arc::new(ManualClock::new(start)));
    let mut group = c.benchmark_group("session_clock");

    // one instant per minute across a full day
    let instants: Vec<_> = (0..1440).map(|m| start + TimeDelta::minutes(m)).collect();
    group.throughput(Throughput::Elements(instants.len() as u64));
    group.bench_function("phase_at_full_day", |b| {
        b.iter(|| {
            for instant in &instants {
                let _ = black_box(clock.phase_at(black_box(*instant)));
            }
        })
    });

    group.bench_function("next_boundary_after", |b| {
        b.iter(|| clock.next_boundary_after(black_box(start + TimeDelta::hours(3))))
    });
    group.finish();
}

fn bench_calendar(c: &mut Criterion) {
    let calendar = nyse();
    let dates: Vec<_> = (0..365)
        .filter_map(|d| NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|s| s.checked_add_signed(TimeDelta::days(d))))
        .collect();

    c.bench_function("schedule_for_year", |b| {
        b.iter(|| {
            for date in &dates {
                let _ = black_box(calendar.schedule_for(black_box(*date)));
            }
        })
    });
}

fn bench_normalization(c: &mut Criterion) {
    let open = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    let symbols: Vec<String> = ["AAPL", "MSFT", "TSLA", "NVDA"].iter().map(|s| s.to_string()).collect();
    let mut group = c.benchmark_group("normalize_batch");

    for minutes in [30usize, 390] {
        let batch: HashMap<String, Vec<RawBar>> = symbols
            .iter()
            .map(|s| {
                let bars = (0..minutes)
                    .map(|m| RawBar::complete(open + TimeDelta::minutes(m as i64), 1.0, 2.0, 0.5, 1.5, 100))
                    .collect();
                (s.clone(), bars)
            })
            .collect();
        let as_of = open + TimeDelta::minutes(minutes as i64);

        group.throughput(Throughput::Elements((minutes * symbols.len()) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(minutes), &batch, |b, batch| {
            b.iter(|| normalize_batch(black_box(batch), &symbols, as_of))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_phase_classification, bench_calendar, bench_normalization);
criterion_main!(benches);
