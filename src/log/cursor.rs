//! Backward cursor over a periodic log
//!
//! A cursor starts at the bucket containing a timestamp and walks toward
//! older buckets until the stored history runs out. It reads straight from
//! the medium, so it sees what was last flushed.

use crate::error::Result;
use crate::log::periodic::PeriodicLog;
use crate::log::Sample;

/// A position relative to the most recent bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Intervals from the most recent bucket (0 or negative)
    pub delta: i64,
    /// Ring slot of that bucket
    pub slot: usize,
}

/// A cursor reading samples newest first
pub struct Cursor<'a> {
    /// The log being read
    log: &'a mut PeriodicLog,
    /// Next bucket to read, `None` once exhausted
    delta: Option<i64>,
}

impl<'a> Cursor<'a> {
    /// Create a cursor starting `start` intervals from the most recent
    /// bucket; `None` gives an exhausted cursor
    pub(crate) fn new(log: &'a mut PeriodicLog, start: Option<i64>) -> Self {
        Self { log, delta: start }
    }

    /// Position of the next bucket to be read
    pub fn position(&self) -> Option<Position> {
        self.delta.map(|delta| Position {
            delta,
            slot: self.log.get_bucket(delta),
        })
    }

    /// Check if the cursor has run out of history
    pub fn at_end(&self) -> bool {
        self.delta.is_none()
    }

    /// Number of samples left before the history runs out
    pub fn remaining(&self) -> usize {
        match self.delta {
            Some(delta) => (self.log.available() as i64 + delta).max(0) as usize,
            None => 0,
        }
    }

    /// Read up to `max_count` samples
    pub fn read_batch(&mut self, max_count: usize) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(max_count.min(self.remaining()));
        for _ in 0..max_count {
            match self.next() {
                Some(sample) => samples.push(sample?),
                None => break,
            }
        }
        Ok(samples)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let delta = self.delta?;
        let slot = self.log.get_bucket(delta);

        let next = delta - 1;
        self.delta = self.log.holds(next).then_some(next);

        match self.log.read_bucket(slot) {
            Ok(sample) => Some(Ok(sample)),
            Err(e) => {
                self.delta = None;
                Some(Err(e))
            }
        }
    }
}
