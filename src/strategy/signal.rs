//! Entry signals produced by the strategy engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Side, Timeframe};
use crate::rl::StateKey;
use crate::strategy::indicators::IndicatorSnapshot;

/// Context attached to every signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub strategy_name: String,
    pub timeframe: Timeframe,
    pub indicators: IndicatorSnapshot,
    pub state: StateKey,
}

/// A directional entry signal with protective levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: Side,
    /// Q-value of the chosen action at signal time
    pub confidence: f64,
    /// Close of the last candle in the evaluated window
    pub reference_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub generated_at: DateTime<Utc>,
    pub metadata: SignalMetadata,
}

impl TradeSignal {
    /// Stop and target moved to `fill`, keeping their percentage distance from
    /// the signal's reference price
    pub fn levels_at(&self, fill: Decimal) -> (Decimal, Decimal) {
        let reference = self.reference_price;
        if fill == reference || reference <= Decimal::ZERO {
            return (self.stop_loss, self.take_profit);
        }
        let distance = |level: Decimal| (reference - level).abs() / reference * Decimal::ONE_HUNDRED;
        protective_levels(
            self.side,
            fill,
            distance(self.stop_loss),
            distance(self.take_profit),
        )
    }
}

/// Stop and target prices `stop_pct`/`target_pct` percent away from `price`
pub fn protective_levels(
    side: Side,
    price: Decimal,
    stop_pct: Decimal,
    target_pct: Decimal,
) -> (Decimal, Decimal) {
    let hundred = Decimal::ONE_HUNDRED;
    match side {
        Side::Long => (
            price * (hundred - stop_pct) / hundred,
            price * (hundred + target_pct) / hundred,
        ),
        Side::Short => (
            price * (hundred + stop_pct) / hundred,
            price * (hundred - target_pct) / hundred,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_levels() {
        let (stop, target) = protective_levels(Side::Long, dec!(100), dec!(1), dec!(2));
        assert_eq!(stop, dec!(99));
        assert_eq!(target, dec!(102));
    }

    fn signal(side: Side, stop: Decimal, target: Decimal) -> TradeSignal {
        TradeSignal {
            symbol: "BTCUSDT".into(),
            side,
            confidence: 0.0,
            reference_price: dec!(100),
            stop_loss: stop,
            take_profit: target,
            generated_at: chrono::Utc::now(),
            metadata: SignalMetadata {
                strategy_name: "qlearning".into(),
                timeframe: Timeframe::M15,
                indicators: IndicatorSnapshot {
                    bollinger: None,
                    rsi: 50.0,
                    atr: 1.0,
                    current_price: 100.0,
                },
                state: StateKey::from("-1_0"),
            },
        }
    }

    #[test]
    fn test_levels_follow_gapped_fill() {
        let long = signal(Side::Long, dec!(99), dec!(102));
        assert_eq!(long.levels_at(dec!(100)), (dec!(99), dec!(102)));
        assert_eq!(long.levels_at(dec!(98.5)), (dec!(97.515), dec!(100.47)));

        let short = signal(Side::Short, dec!(101), dec!(98));
        assert_eq!(short.levels_at(dec!(110)), (dec!(111.1), dec!(107.8)));
    }

    #[test]
    fn test_short_levels_flip() {
        let (stop, target) = protective_levels(Side::Short, dec!(200), dec!(1.2), dec!(2.5));
        assert_eq!(stop, dec!(202.4));
        assert_eq!(target, dec!(195));
    }
}
