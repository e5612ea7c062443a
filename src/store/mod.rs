//! Page-buffered backing store
//!
//! Writes are coalesced into a single page-aligned buffer and committed to
//! the medium in one transfer when:
//!
//! - the page fills up,
//! - a write arrives that does not continue the buffered span or lands in
//!   another aligned page,
//! - the caller asks for a flush.
//!
//! Every physical transfer holds the [`ExclusiveLock`] and is spaced at least
//! `min_write_interval` after the previous one, which protects media with
//! write-cycle timing limits (serial EEPROMs need ~5-10 ms per page).
//! Reads never consult the write buffer; they return what the medium holds.

use crate::error::{LogError, Result};
use crate::hexdump::hex_dump;
use crate::lock::ExclusiveLock;
use crate::medium::Medium;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Configuration for a backing store and the log on top of it
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Size and alignment of physical writes, a power of two
    pub page_size: usize,
    /// Capacity of device media, and the size given to newly created files
    pub allocation: usize,
    /// Minimum spacing between physical writes
    pub min_write_interval: Duration,
    /// Name of the lock shared by everything using the medium
    pub lock_name: String,
    /// Directory holding the lock file
    pub lock_dir: PathBuf,
    /// Reject every mutation of the log
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 32,
            allocation: 4096,
            min_write_interval: Duration::from_millis(10),
            lock_name: "intlog.lock".to_string(),
            lock_dir: std::env::temp_dir(),
            read_only: false,
        }
    }
}

/// Byte-addressable store that buffers writes one page at a time
pub struct BackingStore {
    /// Where bytes end up
    medium: Medium,
    /// Serializes physical transfers across processes and threads
    lock: ExclusiveLock,
    /// Page size in bytes
    page_size: usize,
    /// Total addressable bytes
    capacity: usize,
    /// Buffered page contents
    page: Vec<u8>,
    /// Absolute offset of the buffered page
    page_start: usize,
    /// First buffered byte (absolute)
    span_start: usize,
    /// One past the last buffered byte (absolute)
    span_end: usize,
    /// When the last physical write finished
    last_flush: Option<Instant>,
    /// Dwell between physical writes
    min_write_interval: Duration,
}

impl BackingStore {
    /// Build a store over `medium`
    pub fn new(medium: Medium, config: &StoreConfig) -> Result<Self> {
        if config.page_size == 0 || !config.page_size.is_power_of_two() {
            return Err(LogError::InvalidPageSize(config.page_size));
        }

        let capacity = medium.intrinsic_len().unwrap_or(config.allocation);
        let lock = ExclusiveLock::open(&config.lock_dir, &config.lock_name)?;

        Ok(Self {
            medium,
            lock,
            page_size: config.page_size,
            capacity,
            page: vec![0u8; config.page_size],
            page_start: 0,
            span_start: 0,
            span_end: 0,
            last_flush: None,
            min_write_interval: config.min_write_interval,
        })
    }

    /// Total addressable bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The underlying medium
    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    /// Whether buffered bytes are waiting for a flush
    pub fn is_dirty(&self) -> bool {
        self.span_end > self.span_start
    }

    /// Buffer `bytes` for `offset`, flushing afterwards if `flush_now`
    ///
    /// Spans that cross a page boundary are split; each page is committed as
    /// soon as it fills.
    pub fn write(&mut self, offset: usize, bytes: &[u8], flush_now: bool) -> Result<()> {
        self.check_bounds(offset, bytes.len())?;

        let mut addr = offset;
        let mut rest = bytes;
        while !rest.is_empty() {
            let page_start = addr & !(self.page_size - 1);
            if self.is_dirty() && (addr != self.span_end || page_start != self.page_start) {
                self.flush()?;
            }
            if !self.is_dirty() {
                self.page_start = page_start;
                self.span_start = addr;
                self.span_end = addr;
            }

            let at = addr - page_start;
            let take = (self.page_size - at).min(rest.len());
            self.page[at..at + take].copy_from_slice(&rest[..take]);
            self.span_end += take;
            addr += take;
            rest = &rest[take..];

            if self.span_end == page_start + self.page_size {
                self.flush()?;
            }
        }

        if flush_now {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit the buffered span to the medium
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        if let Some(last) = self.last_flush {
            let elapsed = last.elapsed();
            if elapsed < self.min_write_interval {
                thread::sleep(self.min_write_interval - elapsed);
            }
        }

        let span = &self.page[self.span_start - self.page_start..self.span_end - self.page_start];
        trace!(
            medium = self.medium.kind(),
            offset = self.span_start,
            len = span.len(),
            "flush\n{}",
            hex_dump(self.span_start, span)
        );

        let guard = self.lock.acquire()?;
        self.medium.write(self.span_start, span)?;
        guard.release();

        self.span_start = self.span_end;
        self.last_flush = Some(Instant::now());
        Ok(())
    }

    /// Read `count` bytes at `offset` straight from the medium
    ///
    /// Unflushed buffered bytes are not visible here.
    pub fn read(&mut self, offset: usize, count: usize) -> Result<Vec<u8>> {
        self.check_bounds(offset, count)?;
        let _guard = self.lock.acquire()?;
        Ok(self.medium.read(offset, count)?)
    }

    /// Full image of the medium
    pub fn snapshot(&mut self) -> Result<Vec<u8>> {
        self.read(0, self.capacity)
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(LogError::OutOfBounds {
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(medium = self.medium.kind(), error = %e, "failed to flush on drop");
        }
    }
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("medium", &self.medium)
            .field("capacity", &self.capacity)
            .field("page_size", &self.page_size)
            .field("page_start", &self.page_start)
            .field("span", &(self.span_start..self.span_end))
            .finish()
    }
}
