//! Fixed-capacity circular log of time buckets
//!
//! The log keeps one signed sample per fixed interval. Buckets are written
//! strictly forward in time; when the last ring slot has been written the
//! next interval re-anchors the header at bucket 0 and flips the generation
//! flag, so the previous generation stays readable behind the write head
//! until it is overwritten.
//!
//! Nothing but the header and the buckets is persisted. On open the write
//! head is recovered by walking generation flags:
//!
//! 1. forward from bucket 0 while the flag matches bucket 0's,
//! 2. backward from the last slot while the flag matches the previous
//!    generation's (only once the ring has wrapped).
//!
//! An interrupted write can only make either walk stop early, so recovery
//! may lose the tail of the history but never invents buckets.

use crate::error::{LogError, Result};
use crate::log::cursor::Cursor;
use crate::log::{
    decode_bucket, encode_bucket, value_range, Anchor, Header, Sample, ANCHOR_OFFSET, DIR_FLAG,
    HEADER_SIZE, NO_HISTORY, WRAPPED_FLAG,
};
use crate::medium::Medium;
use crate::store::{BackingStore, StoreConfig};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use std::io::Write;
use tracing::{debug, info};

/// Lifecycle state of a log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    /// No anchor; the next store bootstraps the ring
    Uninitialized,
    /// Anchored, ring not yet wrapped
    Active,
    /// Ring has wrapped at least once since the last fresh start
    ActiveWrapped,
}

/// Snapshot of a log's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStatus {
    /// Lifecycle state
    pub state: LogState,
    /// Bucket interval in seconds
    pub interval_secs: i64,
    /// Bucket size in bytes
    pub bucket_size: u8,
    /// Number of buckets in the ring
    pub ring_capacity: usize,
    /// Slot of the most recent bucket
    pub last_written_index: usize,
    /// Start of the most recent bucket's interval
    pub last_written_at: Option<NaiveDateTime>,
    /// Buckets holding history, current bucket included
    pub available: usize,
    /// Generation flag of the current pass over the ring
    pub direction_flag: bool,
}

/// How a re-anchor treats the existing history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reanchor {
    /// Continue from the last slot into bucket 0; history survives
    Wrap,
    /// Discard history and invalidate every other bucket
    Fresh,
}

/// A circular log of fixed-interval buckets over a backing store
pub struct PeriodicLog {
    /// Page-buffered access to the medium
    store: BackingStore,
    /// Reject mutations
    read_only: bool,
    /// Bucket interval in seconds, 0 when never formatted
    interval_secs: i64,
    /// Bucket size in bytes
    bucket_size: u8,
    /// Number of buckets that fit after the header
    capacity: usize,
    /// Slot of the most recent bucket
    last_written: usize,
    /// Buckets holding history
    available: usize,
    /// Generation flag of the current pass
    fwd_flag: u8,
    /// Start of the most recent bucket's interval
    last_written_at: Option<NaiveDateTime>,
    /// Ring wrapped since the last fresh start
    wrapped: bool,
}

impl PeriodicLog {
    /// Open a log over `medium`, recovering the write head from what is
    /// stored there
    ///
    /// A medium without a valid header opens as [`LogState::Uninitialized`].
    pub fn open(medium: Medium, config: &StoreConfig) -> Result<Self> {
        let store = BackingStore::new(medium, config)?;
        if store.capacity() <= HEADER_SIZE {
            return Err(LogError::AllocationTooSmall(store.capacity()));
        }

        let mut log = Self {
            store,
            read_only: config.read_only,
            interval_secs: 0,
            bucket_size: 1,
            capacity: 0,
            last_written: 0,
            available: 0,
            fwd_flag: DIR_FLAG,
            last_written_at: None,
            wrapped: false,
        };
        log.recover()?;

        info!(
            medium = log.store.medium().kind(),
            interval_secs = log.interval_secs,
            bucket_size = log.bucket_size,
            ring_capacity = log.capacity,
            state = ?log.state(),
            "opened periodic log"
        );
        Ok(log)
    }

    /// Rebuild bookkeeping from the header and the generation flags
    fn recover(&mut self) -> Result<()> {
        let raw = self.store.read(0, HEADER_SIZE)?;
        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(&raw);
        let header = Header::decode(&bytes);

        // a size that leaves no room for a single bucket is garbage too
        let room = self.store.capacity() - HEADER_SIZE;
        let (interval_secs, bucket_size, anchor) = match header.bucket_size {
            Some(size) if room >= size as usize => (header.interval_secs, size, header.anchor),
            _ => (0, 1, None),
        };
        self.set_geometry(interval_secs, bucket_size)?;

        let anchor = match anchor {
            Some(anchor) if interval_secs > 0 => anchor,
            _ => {
                debug!("no history on medium");
                return Ok(());
            }
        };

        self.fwd_flag = self.flag_at(0)?;
        self.last_written = 0;
        self.available = 1;
        self.wrapped = anchor.wrapped;
        let mut last_at = anchor.timestamp;

        while self.last_written + 1 < self.capacity {
            if self.flag_at(self.last_written + 1)? != self.fwd_flag {
                break;
            }
            self.last_written += 1;
            self.available += 1;
            last_at += self.interval();
        }
        self.last_written_at = Some(last_at);

        if self.wrapped {
            let rev_flag = self.fwd_flag ^ DIR_FLAG;
            let mut bucket = self.capacity - 1;
            while bucket > self.last_written && self.available < self.capacity {
                if self.flag_at(bucket)? != rev_flag {
                    break;
                }
                self.available += 1;
                bucket -= 1;
            }
        }

        debug!(
            last_written = self.last_written,
            available = self.available,
            last_written_at = %last_at,
            wrapped = self.wrapped,
            "recovered write head"
        );
        Ok(())
    }

    /// Reset derived geometry and forget all history in memory
    fn set_geometry(&mut self, interval_secs: i64, bucket_size: u8) -> Result<()> {
        let capacity = (self.store.capacity() - HEADER_SIZE) / bucket_size as usize;
        if capacity == 0 {
            return Err(LogError::AllocationTooSmall(self.store.capacity()));
        }

        self.interval_secs = interval_secs;
        self.bucket_size = bucket_size;
        self.capacity = capacity;
        self.last_written = capacity - 1;
        self.available = 0;
        self.fwd_flag = DIR_FLAG;
        self.last_written_at = None;
        self.wrapped = false;
        Ok(())
    }

    /// Set the bucket interval and size, discarding all history
    pub fn format(&mut self, interval: TimeDelta, bucket_size: u8) -> Result<()> {
        self.ensure_writable()?;
        let interval_secs = interval.num_seconds();
        let geometry = Header::encode_geometry(interval_secs, bucket_size)?;

        // validate against the medium before touching it
        let capacity = (self.store.capacity() - HEADER_SIZE) / bucket_size as usize;
        if capacity == 0 {
            return Err(LogError::AllocationTooSmall(self.store.capacity()));
        }

        self.store
            .write(0, &[geometry[0], geometry[1], NO_HISTORY], true)?;
        self.set_geometry(interval_secs, bucket_size)?;

        info!(
            interval_secs,
            bucket_size,
            ring_capacity = self.capacity,
            "formatted periodic log"
        );
        Ok(())
    }

    /// Whole intervals from the most recent bucket's start to `timestamp`
    ///
    /// Rounds toward negative infinity, so any instant inside the current
    /// bucket is 0 and any instant before it is negative. `None` while there
    /// is no history.
    pub fn bucket_delta(&self, timestamp: NaiveDateTime) -> Option<i64> {
        let last = self.last_written_at?;
        if self.interval_secs <= 0 {
            return None;
        }

        let elapsed = timestamp - last;
        let mut secs = elapsed.num_seconds();
        if elapsed < TimeDelta::seconds(secs) {
            secs -= 1;
        }
        Some(secs.div_euclid(self.interval_secs))
    }

    /// Ring slot `delta` buckets away from the most recent one
    ///
    /// Negative deltas reaching past slot 0 land in the previous generation
    /// at the high end of the ring. Always in `0..ring_capacity`.
    pub fn get_bucket(&self, delta: i64) -> usize {
        let capacity = self.capacity.max(1) as i128;
        (self.last_written as i128 + delta as i128).rem_euclid(capacity) as usize
    }

    /// Record `value` for the interval containing `timestamp`
    ///
    /// - nothing stored yet: anchor half an interval before `timestamp`
    /// - before the current bucket: dropped
    /// - inside the current bucket: overwrite it
    /// - more than a ring ahead: start over as if nothing were stored
    /// - otherwise: mark skipped intervals empty, then write the value,
    ///   wrapping the ring as needed
    pub fn store(&mut self, timestamp: NaiveDateTime, value: i64) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_formatted()?;
        self.check_value(value)?;

        let Some(delta) = self.bucket_delta(timestamp) else {
            return self.restart(timestamp, Sample::Value(value));
        };

        if delta < 0 {
            debug!(%timestamp, delta, "dropping store into the past");
            return Ok(());
        }
        if delta == 0 {
            return self.write_bucket(self.last_written, Sample::Value(value), true);
        }
        if delta > self.capacity as i64 {
            debug!(%timestamp, delta, "gap exceeds ring, starting over");
            return self.restart(timestamp, Sample::Value(value));
        }

        for _ in 1..delta {
            self.advance(Sample::Empty, false)?;
        }
        self.advance(Sample::Value(value), true)
    }

    /// Up to `count` samples, newest first, walking back from the bucket
    /// containing `timestamp`
    ///
    /// Returns fewer (possibly none) when `timestamp` is after the most
    /// recent bucket or the history runs out.
    pub fn fetch(&mut self, timestamp: NaiveDateTime, count: usize) -> Result<Vec<Sample>> {
        self.cursor(timestamp).read_batch(count)
    }

    /// A cursor walking back in time from the bucket containing `timestamp`
    pub fn cursor(&mut self, timestamp: NaiveDateTime) -> Cursor<'_> {
        let start = self
            .bucket_delta(timestamp)
            .filter(|delta| self.holds(*delta));
        Cursor::new(self, start)
    }

    /// Anchor the ring at `timestamp` with `value` in bucket 0
    ///
    /// History survives only when this is the natural continuation of a
    /// ring whose last slot was just written; any other re-anchor starts a
    /// fresh ring.
    pub fn set_anchor(&mut self, timestamp: NaiveDateTime, value: i64) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_formatted()?;
        self.check_value(value)?;

        let continues = self.available > 0
            && self.last_written + 1 == self.capacity
            && self.last_written_at.map(|at| at + self.interval()) == Some(timestamp);
        let mode = if continues {
            Reanchor::Wrap
        } else {
            Reanchor::Fresh
        };
        self.reanchor(timestamp, Sample::Value(value), mode)
    }

    /// Commit any buffered bytes
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Copy the raw medium, header and ring, to `writer`
    pub fn export_image<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let image = self.store.snapshot()?;
        writer.write_all(&image)?;
        Ok(())
    }

    /// Lifecycle state
    pub fn state(&self) -> LogState {
        if self.available == 0 {
            LogState::Uninitialized
        } else if self.wrapped {
            LogState::ActiveWrapped
        } else {
            LogState::Active
        }
    }

    /// Snapshot of the bookkeeping
    pub fn status(&self) -> LogStatus {
        LogStatus {
            state: self.state(),
            interval_secs: self.interval_secs,
            bucket_size: self.bucket_size,
            ring_capacity: self.capacity,
            last_written_index: self.last_written,
            last_written_at: self.last_written_at,
            available: self.available,
            direction_flag: self.fwd_flag != 0,
        }
    }

    /// Bucket interval
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::seconds(self.interval_secs)
    }

    /// Bucket size in bytes
    pub fn bucket_size(&self) -> u8 {
        self.bucket_size
    }

    /// Number of buckets in the ring
    pub fn ring_capacity(&self) -> usize {
        self.capacity
    }

    /// Slot of the most recent bucket
    pub fn last_written_index(&self) -> usize {
        self.last_written
    }

    /// Start of the most recent bucket's interval
    pub fn last_written_at(&self) -> Option<NaiveDateTime> {
        self.last_written_at
    }

    /// Buckets holding history
    pub fn available(&self) -> usize {
        self.available
    }

    /// The backing store
    pub fn backing_store(&self) -> &BackingStore {
        &self.store
    }

    /// Whether the bucket `delta` away from the most recent holds history
    pub(crate) fn holds(&self, delta: i64) -> bool {
        delta <= 0 && 1 - delta <= self.available as i64
    }

    /// Read and decode the bucket in `slot`
    pub(crate) fn read_bucket(&mut self, slot: usize) -> Result<Sample> {
        let bytes = self
            .store
            .read(self.bucket_offset(slot), self.bucket_size as usize)?;
        Ok(decode_bucket(&bytes))
    }

    /// Step the write head one interval forward and write `sample` there
    fn advance(&mut self, sample: Sample, flush: bool) -> Result<()> {
        let next_at = self.last_written_at.ok_or(LogError::Unformatted)? + self.interval();

        if self.last_written + 1 == self.capacity {
            return self.reanchor(next_at, sample, Reanchor::Wrap);
        }

        self.last_written += 1;
        self.last_written_at = Some(next_at);
        self.available = (self.available + 1).min(self.capacity);
        self.write_bucket(self.last_written, sample, flush)
    }

    /// Fresh ring anchored half an interval before `timestamp`
    fn restart(&mut self, timestamp: NaiveDateTime, sample: Sample) -> Result<()> {
        let anchor_at = timestamp - TimeDelta::seconds(self.interval_secs / 2);
        self.reanchor(anchor_at, sample, Reanchor::Fresh)
    }

    /// Write a new anchor plus bucket 0 and flip the generation flag
    fn reanchor(&mut self, timestamp: NaiveDateTime, sample: Sample, mode: Reanchor) -> Result<()> {
        // the header holds whole seconds
        let timestamp = timestamp
            .with_nanosecond(0)
            .ok_or(LogError::AnchorOutOfRange(timestamp))?;
        let wrapped = mode == Reanchor::Wrap;
        let anchor = Anchor { timestamp, wrapped }.encode()?;

        self.fwd_flag ^= DIR_FLAG;

        if mode == Reanchor::Fresh {
            // drop the old anchor first so a crash here reads as no history
            self.store.write(ANCHOR_OFFSET, &[NO_HISTORY], true)?;

            // every later slot must read as the previous generation, or the
            // forward scan would run into stale bytes
            let stale = encode_bucket(Sample::Empty, self.bucket_size, self.fwd_flag ^ DIR_FLAG);
            for slot in 1..self.capacity {
                let offset = self.bucket_offset(slot);
                self.store.write(offset, &stale, false)?;
            }
            self.available = 1;
        } else {
            if self.wrapped {
                // until the new anchor lands the header must describe the
                // current generation as a plain forward run
                let month = self.store.read(ANCHOR_OFFSET + 1, 1)?[0] & !WRAPPED_FLAG;
                self.store.write(ANCHOR_OFFSET + 1, &[month], true)?;
            }
            self.available = (self.available + 1).min(self.capacity);
        }

        // bucket 0 before the anchor, so a torn re-anchor recovers an older
        // head and never a later one
        self.write_bucket(0, sample, true)?;
        self.store.write(ANCHOR_OFFSET, &anchor, true)?;

        self.wrapped = wrapped;
        self.last_written = 0;
        self.last_written_at = Some(timestamp);

        debug!(
            %timestamp,
            ?mode,
            direction_flag = self.fwd_flag != 0,
            available = self.available,
            "re-anchored ring"
        );
        Ok(())
    }

    fn write_bucket(&mut self, slot: usize, sample: Sample, flush: bool) -> Result<()> {
        let bytes = encode_bucket(sample, self.bucket_size, self.fwd_flag);
        let offset = self.bucket_offset(slot);
        self.store.write(offset, &bytes, flush)
    }

    fn flag_at(&mut self, slot: usize) -> Result<u8> {
        let offset = self.bucket_offset(slot);
        let byte = self.store.read(offset, 1)?;
        Ok(byte[0] & DIR_FLAG)
    }

    fn bucket_offset(&self, slot: usize) -> usize {
        HEADER_SIZE + slot * self.bucket_size as usize
    }

    fn check_value(&self, value: i64) -> Result<()> {
        if value_range(self.bucket_size).contains(&value) {
            Ok(())
        } else {
            Err(LogError::ValueOutOfRange {
                value,
                bucket_size: self.bucket_size,
            })
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            Err(LogError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn ensure_formatted(&self) -> Result<()> {
        if self.interval_secs > 0 {
            Ok(())
        } else {
            Err(LogError::Unformatted)
        }
    }
}

impl std::fmt::Debug for PeriodicLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicLog")
            .field("status", &self.status())
            .field("read_only", &self.read_only)
            .field("store", &self.store)
            .finish()
    }
}
