//! Exit decisions for open positions
//!
//! Hard levels are checked before the strategy is consulted. Whatever closes a
//! position, exactly one learning update is credited for it.

use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::Candle;
use crate::strategy::engine::StrategyEngine;
use crate::strategy::position::{ExitReason, Position};

/// Why and where an open position should be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    /// Crossed level for hard exits, the evaluated price otherwise
    pub reference_price: Decimal,
}

/// Drives one open position through the engine
pub struct PositionLifecycle<'a> {
    engine: &'a mut StrategyEngine,
}

impl<'a> PositionLifecycle<'a> {
    pub fn new(engine: &'a mut StrategyEngine) -> Self {
        Self { engine }
    }

    /// Decide whether `position` closes at `price`.
    ///
    /// The engine is not consulted when a stop or target is crossed, so no
    /// learning happens on that path until [`settle`](Self::settle).
    pub fn evaluate(&mut self, position: &Position, price: Decimal, candles: &[Candle]) -> Option<ExitDecision> {
        if !position.is_open() {
            return None;
        }

        if let Some((reason, level)) = position.hard_exit(price) {
            debug!(symbol = %position.symbol, %reason, %level, %price, "hard exit");
            return Some(ExitDecision {
                reason,
                reference_price: level,
            });
        }

        if self.engine.check_exit_signal(candles, position) {
            return Some(ExitDecision {
                reason: ExitReason::StrategyExitSignal,
                reference_price: price,
            });
        }

        None
    }

    /// Credit a closed position and end the episode.
    ///
    /// A strategy exit was already learned from while deciding, every other
    /// close is learned from here with its realized PnL.
    pub fn settle(&mut self, candles: &[Candle], position: &Position) -> Option<f64> {
        match (position.exit_reason, position.pnl_percent_f64()) {
            (Some(ExitReason::StrategyExitSignal), _) | (None, _) | (_, None) => {
                self.engine.end_episode();
                None
            }
            (Some(_), Some(pnl)) => self.engine.learn_from_close(candles, position.side, pnl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{flat_series, Side, Timeframe};
    use crate::rl::{Action, QLearningConfig, StateKey};
    use crate::strategy::engine::EngineConfig;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn engine() -> StrategyEngine {
        let config = EngineConfig {
            learning: QLearningConfig {
                epsilon: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut engine = StrategyEngine::with_seed(config, 3);
        engine.q_table_mut().entry(&StateKey::from("-1_0")).long = 1.0;
        engine
    }

    fn window() -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        flat_series(start, Timeframe::M15, &[dec!(100); 20])
    }

    fn open_long(engine: &mut StrategyEngine) -> Position {
        let signal = engine.check_entry_signal(&window(), "SOLUSDT").unwrap();
        Position::open(&signal, dec!(100), dec!(500), dec!(5), signal.generated_at)
    }

    #[test]
    fn test_stop_checked_before_strategy() {
        let mut engine = engine();
        let position = open_long(&mut engine);
        let before = engine.q_table().q_value(&StateKey::from("-1_0"), Action::Long);

        let decision = PositionLifecycle::new(&mut engine)
            .evaluate(&position, dec!(98.5), &window())
            .unwrap();
        assert_eq!(decision.reason, ExitReason::StopLoss);
        assert_eq!(decision.reference_price, dec!(99));
        // Strategy untouched
        assert_eq!(engine.q_table().q_value(&StateKey::from("-1_0"), Action::Long), before);
        assert!(engine.pending_transition().is_some());
    }

    #[test]
    fn test_target_exit_uses_level() {
        let mut engine = engine();
        let position = open_long(&mut engine);
        let decision = PositionLifecycle::new(&mut engine)
            .evaluate(&position, dec!(103), &window())
            .unwrap();
        assert_eq!(decision.reason, ExitReason::TakeProfit);
        assert_eq!(decision.reference_price, dec!(102));
    }

    #[test]
    fn test_strategy_exit_at_current_price() {
        let mut engine = engine();
        let position = open_long(&mut engine);
        engine.q_table_mut().entry(&StateKey::from("-1_0")).short = 5.0;

        let decision = PositionLifecycle::new(&mut engine)
            .evaluate(&position, dec!(100.5), &window())
            .unwrap();
        assert_eq!(decision.reason, ExitReason::StrategyExitSignal);
        assert_eq!(decision.reference_price, dec!(100.5));
    }

    #[test]
    fn test_no_exit_keeps_position() {
        let mut engine = engine();
        let position = open_long(&mut engine);
        assert!(PositionLifecycle::new(&mut engine)
            .evaluate(&position, dec!(100.2), &window())
            .is_none());
    }

    #[test]
    fn test_settle_hard_exit_learns_once() {
        let mut engine = engine();
        let mut position = open_long(&mut engine);
        let at = position.opened_at + chrono::Duration::minutes(15);
        position.close(dec!(99), ExitReason::StopLoss, at).unwrap();

        let q = PositionLifecycle::new(&mut engine).settle(&window(), &position);
        // long += 0.3 * (-1 * 5 + 0.7 * 1.0 - 1.0)
        assert!((q.unwrap() - (1.0 + 0.3 * (-5.0 + 0.7 - 1.0))).abs() < 1e-9);
        assert!(engine.pending_transition().is_none());

        assert_eq!(PositionLifecycle::new(&mut engine).settle(&window(), &position), None);
    }

    #[test]
    fn test_settle_strategy_exit_only_ends_episode() {
        let mut engine = engine();
        let mut position = open_long(&mut engine);
        engine.q_table_mut().entry(&StateKey::from("-1_0")).short = 5.0;
        let decision = PositionLifecycle::new(&mut engine)
            .evaluate(&position, dec!(100), &window())
            .unwrap();
        let short_after_decision = engine.q_table().q_value(&StateKey::from("-1_0"), Action::Short);

        position
            .close(decision.reference_price, decision.reason, position.opened_at)
            .unwrap();
        assert_eq!(PositionLifecycle::new(&mut engine).settle(&window(), &position), None);
        assert!(engine.pending_transition().is_none());
        assert_eq!(
            engine.q_table().q_value(&StateKey::from("-1_0"), Action::Short),
            short_after_decision
        );
        assert_eq!(position.side, Side::Long);
    }
}
