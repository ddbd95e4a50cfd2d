//! State Representation
//!
//! Discretizes an indicator snapshot into a table key built from two
//! independent axes: where price sits relative to the Bollinger bands and
//! which RSI zone we are in.

use serde::{Deserialize, Serialize};

use crate::strategy::indicators::{BollingerBands, IndicatorSnapshot};

/// Price position relative to the bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceBucket {
    /// Above the upper band
    FarAbove,
    /// Inside the bands, above the middle
    AboveMid,
    /// Inside the bands, at or below the middle
    BelowMid,
    /// Below the lower band
    FarBelow,
}

impl PriceBucket {
    /// First matching rule wins; price equal to the middle band lands in `BelowMid`
    pub fn classify(price: f64, bands: &BollingerBands) -> Self {
        if price > bands.upper {
            PriceBucket::FarAbove
        } else if price < bands.lower {
            PriceBucket::FarBelow
        } else if price > bands.middle {
            PriceBucket::AboveMid
        } else {
            PriceBucket::BelowMid
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            PriceBucket::FarAbove => 2,
            PriceBucket::AboveMid => 1,
            PriceBucket::BelowMid => -1,
            PriceBucket::FarBelow => -2,
        }
    }
}

/// RSI zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsiBucket {
    Overbought,
    Strong,
    Neutral,
    Weak,
    Oversold,
}

impl RsiBucket {
    pub fn classify(rsi: f64) -> Self {
        if rsi > 70.0 {
            RsiBucket::Overbought
        } else if rsi < 30.0 {
            RsiBucket::Oversold
        } else if rsi > 60.0 {
            RsiBucket::Strong
        } else if rsi < 40.0 {
            RsiBucket::Weak
        } else {
            RsiBucket::Neutral
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            RsiBucket::Overbought => 2,
            RsiBucket::Strong => 1,
            RsiBucket::Neutral => 0,
            RsiBucket::Weak => -1,
            RsiBucket::Oversold => -2,
        }
    }
}

/// Discrete state label, e.g. `"1_-2"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn from_buckets(price: PriceBucket, rsi: RsiBucket) -> Self {
        StateKey(format!("{}_{}", price.code(), rsi.code()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateKey {
    fn from(raw: &str) -> Self {
        StateKey(raw.to_string())
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for turning indicator snapshots into table keys
pub trait StateEncoder: Send + Sync {
    /// `None` when the snapshot is missing the data the encoding needs
    fn encode(&self, indicators: &IndicatorSnapshot) -> Option<StateKey>;
}

/// Bollinger position x RSI zone encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct BandRsiEncoder;

impl BandRsiEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl StateEncoder for BandRsiEncoder {
    fn encode(&self, indicators: &IndicatorSnapshot) -> Option<StateKey> {
        let bands = indicators.bollinger.as_ref()?;
        let price = PriceBucket::classify(indicators.current_price, bands);
        let rsi = RsiBucket::classify(indicators.rsi);
        Some(StateKey::from_buckets(price, rsi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(price: f64, rsi: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            bollinger: Some(BollingerBands {
                upper: 110.0,
                middle: 100.0,
                lower: 90.0,
            }),
            rsi,
            atr: 1.0,
            current_price: price,
        }
    }

    #[test]
    fn test_price_buckets() {
        let enc = BandRsiEncoder::new();
        assert_eq!(enc.encode(&snapshot(111.0, 50.0)).unwrap().as_str(), "2_0");
        assert_eq!(enc.encode(&snapshot(105.0, 50.0)).unwrap().as_str(), "1_0");
        assert_eq!(enc.encode(&snapshot(95.0, 50.0)).unwrap().as_str(), "-1_0");
        assert_eq!(enc.encode(&snapshot(89.0, 50.0)).unwrap().as_str(), "-2_0");
    }

    #[test]
    fn test_price_on_middle_band_is_below_mid() {
        let enc = BandRsiEncoder::new();
        assert_eq!(enc.encode(&snapshot(100.0, 50.0)).unwrap().as_str(), "-1_0");
    }

    #[test]
    fn test_band_edges_stay_inside() {
        assert_eq!(
            PriceBucket::classify(110.0, &snapshot(0.0, 0.0).bollinger.unwrap()),
            PriceBucket::AboveMid
        );
        assert_eq!(
            PriceBucket::classify(90.0, &snapshot(0.0, 0.0).bollinger.unwrap()),
            PriceBucket::BelowMid
        );
    }

    #[test]
    fn test_rsi_buckets() {
        assert_eq!(RsiBucket::classify(75.0), RsiBucket::Overbought);
        assert_eq!(RsiBucket::classify(70.0), RsiBucket::Strong);
        assert_eq!(RsiBucket::classify(65.0), RsiBucket::Strong);
        assert_eq!(RsiBucket::classify(60.0), RsiBucket::Neutral);
        assert_eq!(RsiBucket::classify(40.0), RsiBucket::Neutral);
        assert_eq!(RsiBucket::classify(35.0), RsiBucket::Weak);
        assert_eq!(RsiBucket::classify(30.0), RsiBucket::Weak);
        assert_eq!(RsiBucket::classify(10.0), RsiBucket::Oversold);
    }

    #[test]
    fn test_missing_bands_yield_no_state() {
        let mut snap = snapshot(100.0, 50.0);
        snap.bollinger = None;
        assert_eq!(BandRsiEncoder::new().encode(&snap), None);
    }

    #[test]
    fn test_identical_buckets_share_a_key() {
        let enc = BandRsiEncoder::new();
        let a = enc.encode(&snapshot(101.0, 61.0)).unwrap();
        let b = enc.encode(&snapshot(109.0, 69.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "1_1");
    }
}
