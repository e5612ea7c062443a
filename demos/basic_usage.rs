//! Basic usage example for the periodic log
//!
//! This example demonstrates:
//! 1. Creating a file-backed log and formatting it
//! 2. Storing a simulated pressure reading every five minutes, with a gap
//! 3. Reading history back, newest first
//! 4. Reopening the file and checking the recovered write head
//!
//! Run with `RUST_LOG=periodic_log=debug` to watch recovery and re-anchoring.

use chrono::{NaiveDate, TimeDelta};
use periodic_log::{FileMedium, Medium, PeriodicLog, Sample, StoreConfig};
use tracing_subscriber::EnvFilter;

fn main() -> periodic_log::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::temp_dir().join("periodic_log_example.dat");
    let _ = std::fs::remove_file(&path);
    println!("Using log file at: {:?}", path);

    let config = StoreConfig {
        page_size: 32,
        allocation: 512,
        ..StoreConfig::default()
    };

    let interval = TimeDelta::minutes(5);
    let t0 = NaiveDate::from_ymd_opt(2024, 3, 10)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .expect("valid start time");

    let status = {
        let mut log = PeriodicLog::open(Medium::File(FileMedium::open(&path, config.allocation)?), &config)?;
        log.format(interval, 3)?;
        println!("Ring holds {} buckets", log.ring_capacity());

        // hectopascals * 10, with the sensor offline for half an hour at step 20
        for step in 0..48i32 {
            if (20..26).contains(&step) {
                continue;
            }
            let reading = 10130 + i64::from(step % 7) * 3 - 9;
            log.store(t0 + interval * step, reading)?;
        }

        let latest = t0 + interval * 47;
        println!("Last 12 buckets, newest first:");
        for (i, sample) in log.fetch(latest, 12)?.iter().enumerate() {
            match sample {
                Sample::Value(v) => println!("  -{:>3} min: {}.{} hPa", i * 5, v / 10, v % 10),
                Sample::Empty => println!("  -{:>3} min: (no sample)", i * 5),
            }
        }

        let gap = t0 + interval * 25;
        println!("Around the outage: {:?}", log.fetch(gap, 8)?);
        log.status()
    };

    let log = PeriodicLog::open(Medium::File(FileMedium::open(&path, 0)?), &config)?;
    assert_eq!(log.status(), status);
    println!("Reopened: {:?}", log.status());

    let _ = std::fs::remove_file(&path);
    Ok(())
}
