//! DATE, TIME and TIMESTAMP wire values
//!
//! - DATE: signed days since 1858-11-17 (the modified Julian day epoch)
//! - TIME: unsigned count of 1/10000 second units since midnight
//! - TIMESTAMP: DATE followed by TIME, 8 bytes
//!
//! Field values are kept in row buffers as big-endian bytes of those widths.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

/// Time units per second
pub const TIME_FRACTIONS: u32 = 10_000;

const SECONDS_PER_DAY: u32 = 86_400;

fn epoch() -> NaiveDate {
    // 1858-11-17 is always representable
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or(NaiveDate::MIN)
}

/// Encode a date as days since the epoch
pub fn encode_date(date: NaiveDate) -> i32 {
    date.signed_duration_since(epoch()).num_days() as i32
}

/// Decode days since the epoch
pub fn decode_date(days: i32) -> Result<NaiveDate> {
    epoch()
        .checked_add_signed(Duration::days(days as i64))
        .ok_or_else(|| Error::protocol(format!("date out of range: {}", days)))
}

/// Encode a time of day in 1/10000 second units
///
/// Sub-100µs precision is truncated.
pub fn encode_time(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() * TIME_FRACTIONS + time.nanosecond() / 100_000
}

/// Decode a time of day from 1/10000 second units
pub fn decode_time(fractions: u32) -> Result<NaiveTime> {
    let secs = fractions / TIME_FRACTIONS;
    if secs >= SECONDS_PER_DAY {
        return Err(Error::protocol(format!("time out of range: {}", fractions)));
    }
    let nanos = (fractions % TIME_FRACTIONS) * 100_000;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or_else(|| Error::protocol(format!("time out of range: {}", fractions)))
}

/// Encode a timestamp into its 8-byte field form
pub fn encode_timestamp(ts: NaiveDateTime) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&encode_date(ts.date()).to_be_bytes());
    out[4..].copy_from_slice(&encode_time(ts.time()).to_be_bytes());
    out
}

/// Decode a timestamp from its 8-byte field form
pub fn decode_timestamp(bytes: &[u8]) -> Result<NaiveDateTime> {
    if bytes.len() != 8 {
        return Err(Error::protocol(format!(
            "timestamp needs 8 bytes, got {}",
            bytes.len()
        )));
    }
    let days = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let fractions = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(NaiveDateTime::new(decode_date(days)?, decode_time(fractions)?))
}
