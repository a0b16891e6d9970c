use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use serde_json::{json, Value};

use fullhouse::model::UnitId;
use fullhouse::notify::InvalidationHub;
use fullhouse::store::{InMemoryConfig, InMemoryDirectory, InMemoryStatusMap};
use fullhouse::{BookingCore, Collaborators, CoreConfig, ValidationContext};

const STATUSES: [&str; 5] = ["booked", "pending", "blocked", "external", "mystery"];

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len().max(1) as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().copied().unwrap_or_default().as_secs_f64() * 1000.0,
    );
}

fn day(start: NaiveDate, offset: u64) -> String {
    (start + Days::new(offset)).format("%Y-%m-%d").to_string()
}

/// A year of cells for `units` units with a deterministic status pattern.
fn synthetic_cells(start: NaiveDate, units: i64, days: u64) -> Vec<(String, Value)> {
    let mut cells = Vec::new();
    for d in 0..days {
        for u in 1..=units {
            let n = (d as i64 * 7 + u * 13) % 11;
            if let Some(status) = STATUSES.get(n as usize) {
                cells.push((format!("{u}_{}_full", day(start, d)), json!(status)));
            }
        }
    }
    cells
}

fn setup(units: i64, days: u64) -> (Arc<BookingCore>, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let cells = synthetic_cells(start, units, days);
    println!("  {} cells over {units} units x {days} days", cells.len());

    let mut events = serde_json::Map::new();
    for d in (0..days).step_by(30) {
        events.insert(day(start, d), json!({"is_private_event": true, "event_title": "Buyout"}));
    }

    let core = BookingCore::new(
        Collaborators {
            config: Arc::new(InMemoryConfig::new().with("private_events", Value::Object(events))),
            status_map: Arc::new(InMemoryStatusMap::from_cells(cells)),
            directory: Arc::new(InMemoryDirectory::with_units((1..=units).map(UnitId::Num))),
            feed: None,
        },
        CoreConfig::default(),
        Arc::new(InvalidationHub::new()),
    )
    .expect("built-in rules register");
    (Arc::new(core), start)
}

async fn phase1_cold_and_warm_counts(core: &BookingCore, start: NaiveDate, days: u64) {
    let t = Instant::now();
    core.counts_for_range(&day(start, 0), &day(start, days - 1)).await.unwrap();
    println!("  cold range of {days} days: {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);

    let mut latencies = Vec::with_capacity(days as usize);
    for d in 0..days {
        let t = Instant::now();
        core.counts_for_date(&day(start, d)).await.unwrap();
        latencies.push(t.elapsed());
    }
    print_latency("cached counts_for_date", &mut latencies);
}

async fn phase2_validation(core: &BookingCore, start: NaiveDate, days: u64) {
    let mut booking = Vec::new();
    let mut range = Vec::new();
    let mut rejected = 0usize;
    for d in 0..days {
        let request = ValidationContext::for_date(&day(start, d)).with_selection(&[UnitId::Num(1), UnitId::Num(2)]);
        let t = Instant::now();
        if core.validate_booking(request).await.is_err() {
            rejected += 1;
        }
        booking.push(t.elapsed());

        let request = ValidationContext::for_range(&day(start, d), &day(start, (d + 6).min(days - 1)));
        let t = Instant::now();
        let _ = core.validate_date_range(request).await;
        range.push(t.elapsed());
    }
    println!("  {rejected}/{days} booking requests rejected");
    print_latency("validate_booking", &mut booking);
    print_latency("validate_date_range (7 days)", &mut range);
}

async fn phase3_reads_under_writes(core: Arc<BookingCore>, start: NaiveDate, units: i64, days: u64) {
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let core = core.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut writes = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let unit = (writes as i64 % units) + 1;
                let key = format!("{unit}_{}_full", day(start, writes % days));
                let value = if writes % 2 == 0 { json!("booked") } else { Value::Null };
                core.update_cell_statuses(HashMap::from([(key, value)])).await.unwrap();
                writes += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            writes
        })
    };

    let mut readers = Vec::new();
    for r in 0..8u64 {
        let core = core.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(500);
            for i in 0..500u64 {
                let date = day(start, (r * 31 + i) % days);
                let t = Instant::now();
                core.counts_for_date(&date).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    let writes = writer.await.unwrap_or_default();

    println!("  {writes} invalidating writes during the read phase");
    print_latency("counts_for_date under writes", &mut all);
}

#[tokio::main]
async fn main() {
    let units: i64 = std::env::var("FULLHOUSE_BENCH_UNITS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(40);
    let days: u64 = 365;

    println!("=== fullhouse stress benchmark ===\n");

    println!("[setup]");
    let (core, start) = setup(units, days);

    println!("\n[phase 1] counts");
    phase1_cold_and_warm_counts(&core, start, days).await;

    println!("\n[phase 2] rule pipelines");
    phase2_validation(&core, start, days).await;

    println!("\n[phase 3] reads under invalidating writes");
    phase3_reads_under_writes(core, start, units, days).await;

    println!("\n=== benchmark complete ===");
}
