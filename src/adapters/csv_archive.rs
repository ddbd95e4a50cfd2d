//! Candle archive backed by CSV files
//!
//! Layout: `{dir}/{SYMBOL}_{timeframe}.csv` with a header row and columns
//! `timestamp,open,high,low,close,volume`. Timestamps may be RFC 3339, a
//! naive `%Y-%m-%d %H:%M:%S` in UTC, or epoch seconds/milliseconds.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::adapters::memory::tail_in_range;
use crate::adapters::traits::{MarketDataSource, TimeRange};
use crate::domain::{Candle, Timeframe};
use crate::error::{QTradeError, Result};

#[derive(Debug, Clone)]
pub struct CsvCandleArchive {
    dir: PathBuf,
}

impl CsvCandleArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_ascii_uppercase(), timeframe.as_str()))
    }

    /// Symbols with an archive file for `timeframe`, sorted
    pub async fn symbols(&self, timeframe: Timeframe) -> Result<Vec<String>> {
        let suffix = format!("_{}.csv", timeframe.as_str());
        let mut symbols = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(symbol) = name.strip_suffix(&suffix) {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    async fn load(&self, path: &Path) -> Result<Vec<Candle>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QTradeError::MarketDataUnavailable(format!(
                    "no archive at {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let mut candles = parse_candles(&raw)?;
        candles.sort_by_key(|c| c.timestamp);
        debug!(path = %path.display(), candles = candles.len(), "archive loaded");
        Ok(candles)
    }
}

#[async_trait]
impl MarketDataSource for CsvCandleArchive {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>> {
        let candles = self.load(&self.path_for(symbol, timeframe)).await?;
        Ok(tail_in_range(&candles, count, range))
    }
}

/// Parse CSV rows after the header. Short rows are skipped with a warning,
/// unparseable values fail the whole file.
pub fn parse_candles(raw: &str) -> Result<Vec<Candle>> {
    let mut candles = Vec::new();

    for (i, line) in raw.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue; // Skip header
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 6 {
            warn!("Skipping malformed line {}: insufficient columns", i);
            continue;
        }

        let timestamp = parse_timestamp(parts[0])
            .ok_or_else(|| QTradeError::InvalidMarketData(format!("invalid timestamp at line {}", i)))?;
        let field = |idx: usize| {
            Decimal::from_str(parts[idx]).map_err(|e| {
                QTradeError::InvalidMarketData(format!("invalid number at line {} column {}: {}", i, idx, e))
            })
        };

        candles.push(Candle {
            timestamp,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }

    Ok(candles)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = s.parse::<i64>() {
        // Unix timestamp (seconds or milliseconds)
        return if ts > 1_000_000_000_000 {
            Utc.timestamp_millis_opt(ts).single()
        } else {
            Utc.timestamp_opt(ts, 0).single()
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}
