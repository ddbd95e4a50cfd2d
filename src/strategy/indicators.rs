//! Technical indicators over a trailing candle window
//!
//! Everything here is plain `f64` math; prices arrive as `Decimal` candles and are
//! converted once at the boundary.

use serde::{Deserialize, Serialize};

use crate::domain::Candle;
use crate::error::{QTradeError, Result};

/// Bollinger lookback
pub const BOLLINGER_PERIOD: usize = 20;
/// Band width in standard deviations
pub const BOLLINGER_STD_DEV: f64 = 2.0;
/// RSI lookback
pub const RSI_PERIOD: usize = 14;
/// ATR lookback
pub const ATR_PERIOD: usize = 14;

/// Upper/middle/lower Bollinger bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Indicator values derived from one candle window; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// `None` until the window covers a full band period
    pub bollinger: Option<BollingerBands>,
    pub rsi: f64,
    pub atr: f64,
    pub current_price: f64,
}

impl IndicatorSnapshot {
    /// Compute a snapshot from candles ordered oldest-to-newest
    pub fn compute(candles: &[Candle]) -> Result<Self> {
        let last = candles
            .last()
            .ok_or_else(|| QTradeError::IndicatorUnavailable("empty candle window".into()))?;

        let closes: Vec<f64> = candles.iter().map(Candle::close_f64).collect();

        let rsi = rsi(&closes, RSI_PERIOD).ok_or_else(|| {
            QTradeError::IndicatorUnavailable(format!(
                "RSI needs {} candles, got {}",
                RSI_PERIOD + 1,
                candles.len()
            ))
        })?;

        let atr = atr(candles, ATR_PERIOD).ok_or_else(|| {
            QTradeError::IndicatorUnavailable(format!(
                "ATR needs {} candles, got {}",
                ATR_PERIOD + 1,
                candles.len()
            ))
        })?;

        Ok(Self {
            bollinger: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV),
            rsi,
            atr,
            current_price: last.close_f64(),
        })
    }
}

/// Bollinger bands over the last `period` closes (population standard deviation)
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let n = period as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    Some(BollingerBands {
        upper: mean + width * std,
        middle: mean,
        lower: mean - width * std,
    })
}

/// Wilder RSI; needs `period + 1` closes
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / p;
    let mut avg_loss = -changes[..period].iter().filter(|c| **c < 0.0).sum::<f64>() / p;

    for change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss == 0.0 {
        // Flat window has no direction
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Wilder ATR; needs `period + 1` candles
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close_f64();
            let high = w[1].high_f64();
            let low = w[1].low_f64();
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();

    let p = period as f64;
    let mut value = true_ranges[..period].iter().sum::<f64>() / p;
    for tr in &true_ranges[period..] {
        value = (value * (p - 1.0) + tr) / p;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn series(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let price = Decimal::try_from(*c).unwrap();
                Candle::flat(start + Duration::minutes(15 * i as i64), price)
            })
            .collect()
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let bands = bollinger(&[100.0; 20], 20, 2.0).unwrap();
        assert_eq!(bands.upper, 100.0);
        assert_eq!(bands.middle, 100.0);
        assert_eq!(bands.lower, 100.0);
    }

    #[test]
    fn test_bollinger_uses_trailing_window() {
        let mut closes = vec![1000.0; 5];
        closes.extend([10.0; 20]);
        let bands = bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(bands.middle, 10.0);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, 14), Some(0.0));

        assert_eq!(rsi(&[100.0; 20], 14), Some(50.0));
    }

    #[test]
    fn test_rsi_needs_warmup() {
        assert_eq!(rsi(&[1.0; 14], 14), None);
        assert!(rsi(&[1.0; 15], 14).is_some());
    }

    #[test]
    fn test_atr_of_constant_steps() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + 2.0 * i as f64).collect();
        let value = atr(&series(&closes), 14).unwrap();
        assert!((value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_without_full_band_window() {
        let closes: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let snap = IndicatorSnapshot::compute(&series(&closes)).unwrap();
        assert!(snap.bollinger.is_none());
        assert_eq!(snap.current_price, 115.0);
    }

    #[test]
    fn test_snapshot_rejects_short_window() {
        let err = IndicatorSnapshot::compute(&series(&[100.0; 5])).unwrap_err();
        assert!(matches!(err, QTradeError::IndicatorUnavailable(_)));
        assert!(IndicatorSnapshot::compute(&[]).is_err());
    }
}
