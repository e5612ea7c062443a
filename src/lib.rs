//! Periodic Log - a fixed-capacity circular time-series log for embedded
//! sensor data.
//!
//! # Overview
//!
//! The crate stores one signed integer per fixed-duration time bucket in a
//! ring that survives process restarts and power loss. It has three layers:
//!
//! 1. An exclusive lock, named and shared across processes and threads, that
//!    serializes every physical access to a medium
//! 2. A page-buffered backing store over one of three media: a memory
//!    buffer, a random-access transport device (e.g. a serial EEPROM) or a
//!    memory-mapped file
//! 3. The periodic log itself: bucket arithmetic, ring wrap bookkeeping and
//!    recovery of the write head by scanning generation flags
//!
//! # Key Features
//!
//! - Write coalescing into aligned pages with a minimum dwell between
//!   physical writes, for write-cycle limited devices
//! - Recovery without any replay: only the header and one flag bit per
//!   bucket are consulted on open
//! - Gaps in time are filled with explicit "no sample" buckets
//! - Out-of-order stores are ignored, reads past the history under-fill
//!
//! # Usage
//!
//! ```no_run
//! use chrono::{NaiveDate, TimeDelta};
//! use periodic_log::{Medium, PeriodicLog, SharedMemory, StoreConfig};
//!
//! # fn main() -> periodic_log::Result<()> {
//! let memory = SharedMemory::new(4096);
//! let mut log = PeriodicLog::open(Medium::InMemory(memory), &StoreConfig::default())?;
//! log.format(TimeDelta::seconds(300), 3)?;
//!
//! let now = NaiveDate::from_ymd_opt(2024, 6, 1)
//!     .and_then(|d| d.and_hms_opt(12, 0, 0))
//!     .expect("valid date");
//! log.store(now, 1013)?;
//! let recent = log.fetch(now, 12)?;
//! # let _ = recent;
//! # Ok(())
//! # }
//! ```
//!
//! See the `demos` directory for a complete program.

#![deny(missing_docs)]

mod error;
pub mod hexdump;
mod lock;
mod log;
mod medium;
mod store;

pub use error::{LogError, Result};
pub use lock::{ExclusiveLock, LockGuard};
pub use log::cursor::{Cursor, Position};
pub use log::periodic::{LogState, LogStatus, PeriodicLog};
pub use log::{value_range, Sample};
pub use medium::{FileMedium, Medium, SharedMemory, Transport};
pub use store::{BackingStore, StoreConfig};

/// On-medium layout types and constants
pub mod types {
    pub use crate::log::{Anchor, Header, HEADER_SIZE, MAX_BUCKET_SIZE, MAX_INTERVAL_SECS};
}
