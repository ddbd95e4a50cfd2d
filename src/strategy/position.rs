//! Managed position life cycle
//!
//! A position is created `Open` on entry and mutated exactly once when it
//! closes. `Closed` is terminal.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Side;
use crate::error::{QTradeError, Result};
use crate::strategy::signal::TradeSignal;

/// Position status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    StrategyExitSignal,
    ForcedEndOfPeriod,
}

impl ExitReason {
    /// Exits triggered by a price level rather than the strategy
    pub fn is_hard(&self) -> bool {
        matches!(self, ExitReason::StopLoss | ExitReason::TakeProfit)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop loss",
            ExitReason::TakeProfit => "take profit",
            ExitReason::StrategyExitSignal => "strategy exit signal",
            ExitReason::ForcedEndOfPeriod => "forced end of period",
        };
        f.write_str(s)
    }
}

/// Position record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Quote-currency amount committed at entry
    pub allocation: Decimal,
    pub quantity: Decimal,
    pub status: PositionStatus,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
    pub pnl_amount: Option<Decimal>,
    pub hold_time_secs: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Open a position from a signal at the given fill. Protective levels are
    /// rebased onto the fill so a gapped entry never starts past its own stop.
    pub fn open(
        signal: &TradeSignal,
        entry_price: Decimal,
        allocation: Decimal,
        quantity: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let (stop_loss, take_profit) = signal.levels_at(entry_price);
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            strategy_name: signal.metadata.strategy_name.clone(),
            side: signal.side,
            entry_price,
            stop_loss,
            take_profit,
            allocation,
            quantity,
            status: PositionStatus::Open,
            exit_reason: None,
            exit_price: None,
            pnl_percent: None,
            pnl_amount: None,
            hold_time_secs: None,
            opened_at,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Stop or target crossed at `price`, stop checked first.
    ///
    /// Returns the reason and the level that was crossed.
    pub fn hard_exit(&self, price: Decimal) -> Option<(ExitReason, Decimal)> {
        let (stop_hit, target_hit) = match self.side {
            Side::Long => (price <= self.stop_loss, price >= self.take_profit),
            Side::Short => (price >= self.stop_loss, price <= self.take_profit),
        };

        if stop_hit {
            Some((ExitReason::StopLoss, self.stop_loss))
        } else if target_hit {
            Some((ExitReason::TakeProfit, self.take_profit))
        } else {
            None
        }
    }

    pub fn unrealized_pnl_percent(&self, price: Decimal) -> Decimal {
        pnl_percent(self.side, self.entry_price, price)
    }

    /// Close the position. A second close is rejected.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<&Self> {
        if self.status == PositionStatus::Closed {
            return Err(QTradeError::InvalidStateTransition {
                from: PositionStatus::Closed.to_string(),
                to: PositionStatus::Closed.to_string(),
            });
        }

        let pnl = pnl_percent(self.side, self.entry_price, exit_price);
        self.status = PositionStatus::Closed;
        self.exit_reason = Some(reason);
        self.exit_price = Some(exit_price);
        self.pnl_percent = Some(pnl);
        self.pnl_amount = Some(self.allocation * pnl / Decimal::ONE_HUNDRED);
        self.hold_time_secs = Some((closed_at - self.opened_at).num_seconds());
        self.closed_at = Some(closed_at);
        Ok(self)
    }

    /// Realized PnL percentage as `f64`, `None` while open
    pub fn pnl_percent_f64(&self) -> Option<f64> {
        self.pnl_percent.and_then(|p| p.to_f64())
    }

    pub fn is_win(&self) -> bool {
        self.pnl_percent.map(|p| p > Decimal::ZERO).unwrap_or(false)
    }
}

/// Signed percentage move from entry to exit for the given side
pub fn pnl_percent(side: Side, entry: Decimal, exit: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let diff = match side {
        Side::Long => exit - entry,
        Side::Short => entry - exit,
    };
    diff / entry * Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use crate::rl::StateKey;
    use crate::strategy::indicators::IndicatorSnapshot;
    use crate::strategy::signal::SignalMetadata;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn signal(side: Side, stop: Decimal, target: Decimal) -> TradeSignal {
        TradeSignal {
            symbol: "BTCUSDT".into(),
            side,
            confidence: 0.0,
            reference_price: dec!(100),
            stop_loss: stop,
            take_profit: target,
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
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

    fn open(side: Side, stop: Decimal, target: Decimal) -> Position {
        let s = signal(side, stop, target);
        Position::open(&s, dec!(100), dec!(1000), dec!(10), s.generated_at)
    }

    #[test]
    fn test_pnl_sign_convention() {
        assert_eq!(pnl_percent(Side::Long, dec!(100), dec!(110)), dec!(10));
        assert_eq!(pnl_percent(Side::Short, dec!(100), dec!(90)), dec!(10));
        assert_eq!(pnl_percent(Side::Long, dec!(100), dec!(90)), dec!(-10));
        assert_eq!(pnl_percent(Side::Short, dec!(100), dec!(110)), dec!(-10));
    }

    #[test]
    fn test_hard_exit_long() {
        let pos = open(Side::Long, dec!(98), dec!(115));
        assert_eq!(pos.hard_exit(dec!(100)), None);
        assert_eq!(pos.hard_exit(dec!(97)), Some((ExitReason::StopLoss, dec!(98))));
        assert_eq!(pos.hard_exit(dec!(116)), Some((ExitReason::TakeProfit, dec!(115))));
    }

    #[test]
    fn test_hard_exit_short() {
        let pos = open(Side::Short, dec!(102), dec!(95));
        assert_eq!(pos.hard_exit(dec!(103)), Some((ExitReason::StopLoss, dec!(102))));
        assert_eq!(pos.hard_exit(dec!(95)), Some((ExitReason::TakeProfit, dec!(95))));
        assert_eq!(pos.hard_exit(dec!(99)), None);
    }

    #[test]
    fn test_stop_wins_over_target() {
        // Degenerate levels where both are crossed at once
        let pos = open(Side::Long, dec!(101), dec!(100));
        assert_eq!(pos.hard_exit(dec!(100)).unwrap().0, ExitReason::StopLoss);
    }

    #[test]
    fn test_close_is_terminal() {
        let mut pos = open(Side::Long, dec!(98), dec!(115));
        let at = pos.opened_at + Duration::minutes(45);
        pos.close(dec!(115), ExitReason::TakeProfit, at).unwrap();

        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.pnl_percent, Some(dec!(15)));
        assert_eq!(pos.pnl_amount, Some(dec!(150)));
        assert_eq!(pos.hold_time_secs, Some(45 * 60));
        assert!(pos.is_win());

        let err = pos
            .close(dec!(90), ExitReason::StopLoss, at)
            .unwrap_err();
        assert!(matches!(err, QTradeError::InvalidStateTransition { .. }));
        assert_eq!(pos.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_price, Some(dec!(115)));
    }
}
