//! Market data feeds.
//!
//! A feed is the engine's only source of history. Feeds are read-only and
//! `Send + Sync`, so optimization workers can share one behind an `Arc`
//! while each builds its own engine.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{Bar, Interval, Tick};

/// Feed failures. `NoData` is fatal to the run that requested the range.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no data for {symbol} {interval} in {start}..{end}")]
    NoData {
        symbol: String,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("no tick data for {symbol} in {start}..{end}")]
    NoTickData {
        symbol: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("engine not configured before loading data")]
    NotConfigured,
    #[error("csv file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("bad timestamp '{value}' at line {line}")]
    BadTimestamp { value: String, line: u64 },
}

/// Source of historical bars and ticks for one backtest.
pub trait MarketDataFeed: Send + Sync {
    /// Bars for `symbol` at `interval` within `[start, end]`, ascending by
    /// time. Empty ranges are an error, not an empty vector.
    fn load_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, FeedError>;

    /// Ticks for `symbol` within `[start, end]`, ascending by time.
    fn load_ticks(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Tick>, FeedError>;
}

/// In-memory feed for tests and pre-loaded datasets.
#[derive(Debug, Default, Clone)]
pub struct MemoryFeed {
    bars: Vec<Bar>,
    ticks: Vec<Tick>,
}

impl MemoryFeed {
    pub fn with_bars(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            ticks: Vec::new(),
        }
    }

    pub fn with_ticks(ticks: Vec<Tick>) -> Self {
        Self {
            bars: Vec::new(),
            ticks,
        }
    }
}

impl MarketDataFeed for MemoryFeed {
    fn load_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, FeedError> {
        let bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|b| b.symbol == symbol && b.datetime >= start && b.datetime <= end)
            .cloned()
            .collect();
        if bars.is_empty() {
            return Err(FeedError::NoData {
                symbol: symbol.to_string(),
                interval,
                start,
                end,
            });
        }
        Ok(bars)
    }

    fn load_ticks(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Tick>, FeedError> {
        let ticks: Vec<Tick> = self
            .ticks
            .iter()
            .filter(|t| t.symbol == symbol && t.datetime >= start && t.datetime <= end)
            .cloned()
            .collect();
        if ticks.is_empty() {
            return Err(FeedError::NoTickData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(ticks)
    }
}

/// CSV-backed feed: one file per symbol and interval under a data directory.
///
/// Bar files are named `<symbol>_<interval>.csv` with header
/// `datetime,open,high,low,close,volume`; tick files `<symbol>_tick.csv`
/// with `datetime,last_price,volume`. Timestamps are
/// `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone)]
pub struct CsvFeed {
    dir: PathBuf,
}

impl CsvFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn open(&self, file_name: &str) -> Result<csv::Reader<std::fs::File>, FeedError> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Err(FeedError::FileNotFound(path));
        }
        Ok(csv::Reader::from_path(&path)?)
    }
}

fn parse_timestamp(value: &str, line: u64) -> Result<NaiveDateTime, FeedError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map_err(|_| {
        FeedError::BadTimestamp {
            value: value.to_string(),
            line,
        }
    })
}

impl MarketDataFeed for CsvFeed {
    fn load_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, FeedError> {
        let mut reader = self.open(&format!("{symbol}_{interval}.csv"))?;
        let headers = reader.headers()?.clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        let mut bars = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let field = |name: &str| -> &str {
                index
                    .get(name)
                    .and_then(|&i| record.get(i))
                    .unwrap_or_default()
            };
            let datetime = parse_timestamp(field("datetime"), line as u64 + 2)?;
            if datetime < start || datetime > end {
                continue;
            }
            bars.push(Bar {
                symbol: symbol.to_string(),
                datetime,
                interval,
                open: field("open").parse().unwrap_or(f64::NAN),
                high: field("high").parse().unwrap_or(f64::NAN),
                low: field("low").parse().unwrap_or(f64::NAN),
                close: field("close").parse().unwrap_or(f64::NAN),
                volume: field("volume").parse().unwrap_or(0.0),
            });
        }
        if bars.is_empty() {
            return Err(FeedError::NoData {
                symbol: symbol.to_string(),
                interval,
                start,
                end,
            });
        }
        Ok(bars)
    }

    fn load_ticks(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Tick>, FeedError> {
        let mut reader = self.open(&format!("{symbol}_tick.csv"))?;
        let headers = reader.headers()?.clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect();

        let mut ticks = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let field = |name: &str| -> &str {
                index
                    .get(name)
                    .and_then(|&i| record.get(i))
                    .unwrap_or_default()
            };
            let datetime = parse_timestamp(field("datetime"), line as u64 + 2)?;
            if datetime < start || datetime > end {
                continue;
            }
            ticks.push(Tick {
                symbol: symbol.to_string(),
                datetime,
                last_price: field("last_price").parse().unwrap_or(f64::NAN),
                volume: field("volume").parse().unwrap_or(0.0),
            });
        }
        if ticks.is_empty() {
            return Err(FeedError::NoTickData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(ticks)
    }
}
