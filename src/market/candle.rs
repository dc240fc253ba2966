//! Candle (OHLCV) built from a `tradeBin*` row

use chrono::DateTime;
use serde_json::Value;

use crate::market::message::Record;

/// Represents a single trade bin with OHLCV data and timestamp.
///
/// The timestamp is stored as Unix time in milliseconds. The feed stamps a
/// bin with its close time, so this is the end of the interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    timestamp: u64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Candle {
    pub fn new(timestamp: u64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Reads a bin row: RFC 3339 `timestamp`, numeric `open/high/low/close/volume`.
    /// Returns `None` if any of them is missing, null, or unparseable.
    pub fn from_bin(record: &Record) -> Option<Self> {
        let number = |field: &str| record.get(field).and_then(Value::as_f64);
        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .and_then(|ts| u64::try_from(ts.timestamp_millis()).ok())?;

        Some(Self::new(
            timestamp,
            number("open")?,
            number("high")?,
            number("low")?,
            number("close")?,
            number("volume")?,
        ))
    }

    /// Returns the candle's timestamp (Unix time in milliseconds).
    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_open(&self) -> f64 {
        self.open
    }

    pub fn get_high(&self) -> f64 {
        self.high
    }

    pub fn get_low(&self) -> f64 {
        self.low
    }

    pub fn get_close(&self) -> f64 {
        self.close
    }

    pub fn get_volume(&self) -> f64 {
        self.volume
    }
}
