//! Read-only projections over the table store.
//! Computed on every call, nothing cached.

use serde_json::Value;

use crate::error::{MirrorError, Result};
use crate::market::candle::Candle;
use crate::market::message::Record;
use crate::market::store::{
    INSTRUMENT_TABLE, LEAVES_QTY_FIELD, MARGIN_TABLE, ORDER_BOOK_TABLE, ORDER_TABLE,
    POSITION_TABLE, QUOTE_TABLE, TRADE_TABLE, TableStore,
};
use crate::market::table::Table;
use crate::market::timeframe::Timeframe;

/// The instrument row plus the rounding precision derived from its tick size.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub tick_size: f64,
    /// Decimal places implied by `tick_size`: `trunc(|log10(tick_size)|)`.
    pub tick_log: u32,
    /// Raw row with `tickLog` added.
    pub record: Record,
}

impl Instrument {
    pub fn symbol(&self) -> Option<&str> {
        self.record.get("symbol").and_then(Value::as_str)
    }

    pub fn round(&self, value: f64) -> f64 {
        round_to(value, self.tick_log)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
}

fn live<'a>(store: &'a TableStore, table: &str) -> Result<&'a Table> {
    store
        .get(table)
        .ok_or_else(|| MirrorError::NotReady(table.to_string()))
}

fn first(store: &TableStore, table: &str) -> Result<Record> {
    live(store, table)?
        .first()
        .cloned()
        .ok_or_else(|| MirrorError::EmptyTable(table.to_string()))
}

fn newest<'a>(store: &'a TableStore, table: &str) -> Result<&'a Record> {
    live(store, table)?
        .last()
        .ok_or_else(|| MirrorError::EmptyTable(table.to_string()))
}

fn all(store: &TableStore, table: &str) -> Result<Vec<Record>> {
    Ok(live(store, table)?.to_vec())
}

// Null or absent prices count as zero.
fn price(record: &Record, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

pub fn tick_log(tick_size: f64) -> u32 {
    // nudge so 0.01 -> 2 even when log10 lands one ulp short of -2
    (tick_size.log10().abs() + 1e-9).trunc() as u32
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

pub fn instrument(store: &TableStore) -> Result<Instrument> {
    let mut record = first(store, INSTRUMENT_TABLE)?;
    let tick_size = record
        .get("tickSize")
        .and_then(Value::as_f64)
        .filter(|size| *size > 0.0)
        .ok_or_else(|| MirrorError::MissingField {
            table: INSTRUMENT_TABLE.to_string(),
            field: "tickSize".to_string(),
        })?;
    let tick_log = tick_log(tick_size);
    record.insert("tickLog".to_string(), Value::from(tick_log));

    Ok(Instrument {
        tick_size,
        tick_log,
        record,
    })
}

/// Last trade price and best bid/ask from the newest quote, rounded to the
/// instrument's tick precision.
pub fn ticker(store: &TableStore) -> Result<Ticker> {
    let quote = newest(store, QUOTE_TABLE)?;
    let trade = newest(store, TRADE_TABLE)?;
    let instrument = instrument(store)?;

    let bid = price(quote, "bidPrice");
    let ask = price(quote, "askPrice");
    Ok(Ticker {
        last: instrument.round(price(trade, "price")),
        bid: instrument.round(bid),
        ask: instrument.round(ask),
        mid: instrument.round((bid + ask) / 2.0),
    })
}

pub fn funds(store: &TableStore) -> Result<Record> {
    first(store, MARGIN_TABLE)
}

pub fn position(store: &TableStore) -> Result<Record> {
    first(store, POSITION_TABLE)
}

pub fn market_depth(store: &TableStore) -> Result<Vec<Record>> {
    all(store, ORDER_BOOK_TABLE)
}

pub fn recent_trades(store: &TableStore) -> Result<Vec<Record>> {
    all(store, TRADE_TABLE)
}

pub fn all_orders(store: &TableStore) -> Result<Vec<Record>> {
    all(store, ORDER_TABLE)
}

/// Orders we placed (client order id starts with `prefix`) that still have quantity left.
pub fn open_orders(store: &TableStore, prefix: &str) -> Result<Vec<Record>> {
    Ok(live(store, ORDER_TABLE)?
        .records()
        .filter(|order| {
            let placed_by_us = match order.get("clOrdID") {
                Some(Value::String(id)) => id.starts_with(prefix),
                Some(other) => other.to_string().starts_with(prefix),
                None => false,
            };
            let remaining = order.get(LEAVES_QTY_FIELD).and_then(Value::as_f64).unwrap_or(0.0);
            placed_by_us && remaining > 0.0
        })
        .cloned()
        .collect())
}

pub fn ohlcv(store: &TableStore, timeframe: Timeframe) -> Result<Vec<Record>> {
    all(store, &timeframe.bin_table())
}

/// Bins as candles, skipping rows that lack any OHLCV field.
pub fn ohlcv_candles(store: &TableStore, timeframe: Timeframe) -> Result<Vec<Candle>> {
    Ok(live(store, &timeframe.bin_table())?
        .records()
        .filter_map(Candle::from_bin)
        .collect())
}
