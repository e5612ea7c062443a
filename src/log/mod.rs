//! On-medium layout of the periodic log
//!
//! ```text
//! byte 0      interval seconds, bits 11..4
//! byte 1      interval seconds, bits 3..0 (high nibble) | bucket size (low nibble, 1-8)
//! byte 2      anchor year - 2000, or 0xFF when there is no history
//! byte 3      anchor month (bits 6..0) | ring-has-wrapped flag (bit 7)
//! byte 4..7   anchor day, hour, minute, second
//! byte 8..    buckets, `bucket size` bytes each, big-endian
//! ```
//!
//! A bucket holds one signed sample. Bits 7 and 6 of a stored sample's first
//! byte are always equal, so bit 7 is given over to the generation
//! (direction) flag and restored from bit 6 on decode. The most negative
//! pattern, `0xC0 00 ..`, is reserved for "no sample".
//!
//! The wrapped flag in the month byte is a format extension over the
//! earliest layout, which had no way to tell first-generation buckets from
//! stale bytes left on the medium.

pub mod cursor;
pub mod periodic;

use crate::error::{LogError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::ops::RangeInclusive;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest bucket interval the header can hold, in seconds
pub const MAX_INTERVAL_SECS: i64 = 0xFFF;

/// Largest bucket size in bytes
pub const MAX_BUCKET_SIZE: u8 = 8;

/// Generation flag bit in the first byte of every bucket
pub(crate) const DIR_FLAG: u8 = 0x80;

/// First byte of an empty bucket
pub(crate) const EMPTY_BYTE: u8 = 0xC0;

/// Anchor year byte marking "no history"
pub(crate) const NO_HISTORY: u8 = 0xFF;

/// Offset of the anchor within the header
pub(crate) const ANCHOR_OFFSET: usize = 2;

/// Wrapped flag in the anchor month byte
pub(crate) const WRAPPED_FLAG: u8 = 0x80;

/// One bucket's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// A stored reading
    Value(i64),
    /// An interval with no reading
    Empty,
}

impl Sample {
    /// The reading, if there is one
    pub fn value(self) -> Option<i64> {
        match self {
            Sample::Value(v) => Some(v),
            Sample::Empty => None,
        }
    }

    /// Whether this is the "no sample" marker
    pub fn is_empty(self) -> bool {
        matches!(self, Sample::Empty)
    }
}

impl From<i64> for Sample {
    fn from(value: i64) -> Self {
        Sample::Value(value)
    }
}

/// Anchor timestamp as stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Start of bucket 0's interval
    pub timestamp: NaiveDateTime,
    /// Whether the ring has wrapped since the last fresh start
    pub wrapped: bool,
}

impl Anchor {
    /// Encode as header bytes 2..8
    pub fn encode(&self) -> Result<[u8; 6]> {
        let ts = self.timestamp;
        let year = ts.year() - 2000;
        if !(0..NO_HISTORY as i32).contains(&year) {
            return Err(LogError::AnchorOutOfRange(ts));
        }

        let mut month = ts.month() as u8;
        if self.wrapped {
            month |= WRAPPED_FLAG;
        }

        Ok([
            year as u8,
            month,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
        ])
    }

    /// Decode header bytes 2..8; `None` for the no-history sentinel or any
    /// date that does not exist
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 6 || bytes[0] == NO_HISTORY {
            return None;
        }

        let timestamp = NaiveDate::from_ymd_opt(
            2000 + bytes[0] as i32,
            (bytes[1] & !WRAPPED_FLAG) as u32,
            bytes[2] as u32,
        )?
        .and_hms_opt(bytes[3] as u32, bytes[4] as u32, bytes[5] as u32)?;

        Some(Self {
            timestamp,
            wrapped: bytes[1] & WRAPPED_FLAG != 0,
        })
    }
}

/// Decoded header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Bucket interval in seconds; 0 on a medium never formatted
    pub interval_secs: i64,
    /// Bucket size, `None` when the nibble is out of range
    pub bucket_size: Option<u8>,
    /// Anchor, `None` when there is no history
    pub anchor: Option<Anchor>,
}

impl Header {
    /// Encode interval and bucket size as header bytes 0..2
    pub fn encode_geometry(interval_secs: i64, bucket_size: u8) -> Result<[u8; 2]> {
        if !(1..=MAX_BUCKET_SIZE).contains(&bucket_size) {
            return Err(LogError::InvalidBucketSize(bucket_size));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&interval_secs) {
            return Err(LogError::InvalidInterval(interval_secs));
        }

        let packed = ((interval_secs as u16) << 4) | bucket_size as u16;
        Ok(packed.to_be_bytes())
    }

    /// Decode the first `HEADER_SIZE` bytes of the medium
    ///
    /// A zero size nibble reads as size 1, the way a blank medium would.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let interval_secs = ((bytes[0] as i64) << 4) | (bytes[1] >> 4) as i64;
        let bucket_size = match bytes[1] & 0x0F {
            0 => Some(1),
            n if n <= MAX_BUCKET_SIZE => Some(n),
            _ => None,
        };

        Self {
            interval_secs,
            bucket_size,
            anchor: Anchor::decode(&bytes[ANCHOR_OFFSET..]),
        }
    }
}

/// Values a bucket of `bucket_size` bytes can hold
///
/// The lowest pattern is the empty marker and is excluded.
pub fn value_range(bucket_size: u8) -> RangeInclusive<i64> {
    let half = 1i64 << (8 * bucket_size as u32 - 2);
    -half + 1..=half - 1
}

/// Encode a sample with `flag` in the generation bit
pub(crate) fn encode_bucket(sample: Sample, bucket_size: u8, flag: u8) -> Vec<u8> {
    let size = bucket_size as usize;
    let raw = match sample {
        Sample::Value(v) => v as u64,
        Sample::Empty => (EMPTY_BYTE as u64) << (8 * (size - 1)),
    };

    let mut bytes = raw.to_be_bytes()[8 - size..].to_vec();
    bytes[0] = (bytes[0] & !DIR_FLAG) | flag;
    bytes
}

/// Decode a stored bucket, restoring the sign from bit 6
pub(crate) fn decode_bucket(bytes: &[u8]) -> Sample {
    let mut first = bytes[0];
    if first & 0x40 != 0 {
        first |= DIR_FLAG;
    } else {
        first &= !DIR_FLAG;
    }

    if first == EMPTY_BYTE && bytes[1..].iter().all(|b| *b == 0) {
        return Sample::Empty;
    }

    let raw = bytes[1..]
        .iter()
        .fold(first as u64, |acc, b| (acc << 8) | *b as u64);
    let shift = 64 - 8 * bytes.len() as u32;
    Sample::Value(((raw << shift) as i64) >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_geometry_packing() {
        assert_eq!(Header::encode_geometry(300, 3).unwrap(), [0x12, 0xC3]);
        assert_eq!(Header::encode_geometry(4095, 8).unwrap(), [0xFF, 0xF8]);
        assert!(matches!(
            Header::encode_geometry(300, 9),
            Err(LogError::InvalidBucketSize(9))
        ));
        assert!(matches!(
            Header::encode_geometry(0, 2),
            Err(LogError::InvalidInterval(0))
        ));
        assert!(Header::encode_geometry(4096, 2).is_err());
    }

    #[test]
    fn test_header_decode() {
        let header = Header::decode(&[0x12, 0xC3, 6, 0x85, 4, 3, 2, 1]);
        assert_eq!(header.interval_secs, 300);
        assert_eq!(header.bucket_size, Some(3));
        let anchor = header.anchor.unwrap();
        assert_eq!(anchor.timestamp, at(2006, 5, 4, 3, 2, 1));
        assert!(anchor.wrapped);

        let blank = Header::decode(&[0; HEADER_SIZE]);
        assert_eq!(blank.interval_secs, 0);
        assert_eq!(blank.bucket_size, Some(1));
        // month 0 is not a date
        assert_eq!(blank.anchor, None);

        let erased = Header::decode(&[0xFF; HEADER_SIZE]);
        assert_eq!(erased.bucket_size, None);
        assert_eq!(erased.anchor, None);
    }

    #[test]
    fn test_anchor_encode() {
        let anchor = Anchor {
            timestamp: at(2006, 5, 4, 3, 2, 1),
            wrapped: false,
        };
        assert_eq!(anchor.encode().unwrap(), [6, 5, 4, 3, 2, 1]);
        assert_eq!(Anchor::decode(&anchor.encode().unwrap()), Some(anchor));

        let too_early = Anchor {
            timestamp: at(1999, 12, 31, 23, 59, 59),
            wrapped: false,
        };
        assert!(matches!(too_early.encode(), Err(LogError::AnchorOutOfRange(_))));
        let too_late = Anchor {
            timestamp: at(2255, 1, 1, 0, 0, 0),
            wrapped: false,
        };
        assert!(too_late.encode().is_err());
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(1), -63..=63);
        assert_eq!(value_range(2), -0x3FFF..=0x3FFF);
        assert_eq!(value_range(8), -(1i64 << 62) + 1..=(1i64 << 62) - 1);
    }

    #[test]
    fn test_bucket_flag_does_not_disturb_value() {
        for flag in [0, DIR_FLAG] {
            let bytes = encode_bucket(Sample::Value(0x666), 3, flag);
            assert_eq!(bytes, vec![flag, 0x06, 0x66]);
            assert_eq!(decode_bucket(&bytes), Sample::Value(0x666));

            let bytes = encode_bucket(Sample::Value(-2), 2, flag);
            assert_eq!(bytes[0] & DIR_FLAG, flag);
            assert_eq!(decode_bucket(&bytes), Sample::Value(-2));
        }
    }

    #[test]
    fn test_empty_bucket() {
        assert_eq!(encode_bucket(Sample::Empty, 3, DIR_FLAG), vec![0xC0, 0, 0]);
        assert_eq!(encode_bucket(Sample::Empty, 3, 0), vec![0x40, 0, 0]);
        assert_eq!(decode_bucket(&[0x40, 0, 0]), Sample::Empty);
        assert_eq!(decode_bucket(&[0xC0]), Sample::Empty);
        // the smallest storable value sits right next to the marker
        assert_eq!(decode_bucket(&[0x40, 0, 1]), Sample::Value(-0x3FFFFF));
    }

    #[test]
    fn test_extreme_values_every_size() {
        for size in 1..=MAX_BUCKET_SIZE {
            let range = value_range(size);
            for v in [*range.start(), -1, 0, 1, *range.end()] {
                for flag in [0, DIR_FLAG] {
                    let bytes = encode_bucket(Sample::Value(v), size, flag);
                    assert_eq!(bytes.len(), size as usize);
                    assert_eq!(decode_bucket(&bytes), Sample::Value(v), "size {size} value {v}");
                }
            }
        }
    }
}
