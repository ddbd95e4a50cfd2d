//! Q-learning strategy engine
//!
//! Turns a trailing candle window into a state, learns from the pending
//! transition, and picks the next action. Stop and target distances plus
//! exploration are retuned from recorded performance.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Candle, Side, Timeframe};
use crate::error::{QTradeError, Result};
use crate::rl::{
    Action, BandRsiEncoder, PositionRewardFunction, QLearningConfig, QTable, RewardConfig,
    RewardFunction, RewardTransition, StateEncoder, StateKey,
};
use crate::strategy::indicators::IndicatorSnapshot;
use crate::strategy::performance::PerformanceSummary;
use crate::strategy::position::Position;
use crate::strategy::signal::{protective_levels, SignalMetadata, TradeSignal};

/// Static engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategy name used as half of the persistence key
    pub name: String,
    pub timeframe: Timeframe,
    /// Trailing candles fed to the indicators
    pub window: usize,
    /// Initial stop distance in percent
    pub stop_loss_pct: f64,
    /// Initial target distance in percent
    pub take_profit_pct: f64,
    pub learning: QLearningConfig,
    pub reward: RewardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "qlearning".to_string(),
            timeframe: Timeframe::M15,
            window: 20,
            stop_loss_pct: 1.0,
            take_profit_pct: 2.0,
            learning: QLearningConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}

/// Q-learning trading strategy.
///
/// Owns the table, the pending `(state, action)` pair that the next update
/// will credit, and the risk parameters tuned from performance feedback.
pub struct StrategyEngine {
    config: EngineConfig,
    q_table: QTable,
    encoder: Box<dyn StateEncoder>,
    reward_fn: Box<dyn RewardFunction>,
    rng: Box<dyn RngCore + Send + Sync>,
    epsilon: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    last_state: Option<StateKey>,
    last_action: Option<Action>,
}

impl StrategyEngine {
    /// Create an engine exploring with OS entropy
    pub fn new(config: EngineConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create an engine with a reproducible exploration sequence
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: EngineConfig, rng: impl RngCore + Send + Sync + 'static) -> Self {
        Self {
            q_table: QTable::new(&config.learning),
            encoder: Box::new(BandRsiEncoder::new()),
            reward_fn: Box::new(PositionRewardFunction::with_config(config.reward)),
            rng: Box::new(rng),
            epsilon: config.learning.epsilon,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            last_state: None,
            last_action: None,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn timeframe(&self) -> Timeframe {
        self.config.timeframe
    }

    pub fn window(&self) -> usize {
        self.config.window
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn stop_loss_percentage(&self) -> f64 {
        self.stop_loss_pct
    }

    pub fn take_profit_percentage(&self) -> f64 {
        self.take_profit_pct
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn q_table_mut(&mut self) -> &mut QTable {
        &mut self.q_table
    }

    /// The transition the next learning update will credit
    pub fn pending_transition(&self) -> Option<(&StateKey, Action)> {
        match (&self.last_state, self.last_action) {
            (Some(state), Some(action)) => Some((state, action)),
            _ => None,
        }
    }

    /// Evaluate the trailing window for a new entry.
    ///
    /// Returns `None` on hold and whenever the indicators cannot be computed.
    pub fn check_entry_signal(&mut self, candles: &[Candle], symbol: &str) -> Option<TradeSignal> {
        match self.evaluate_entry(candles, symbol) {
            Ok(signal) => signal,
            Err(e) => {
                debug!(symbol, error = %e, "entry evaluation skipped");
                None
            }
        }
    }

    /// Evaluate whether an open position should be closed by the strategy.
    ///
    /// True exactly when the newly selected action opposes the position.
    pub fn check_exit_signal(&mut self, candles: &[Candle], position: &Position) -> bool {
        match self.evaluate_exit(candles, position) {
            Ok(exit) => exit,
            Err(e) => {
                debug!(symbol = %position.symbol, error = %e, "exit evaluation skipped");
                false
            }
        }
    }

    /// Credit a close that happened without consulting the strategy
    /// (stop, target, or forced close) and end the episode.
    pub fn learn_from_close(&mut self, candles: &[Candle], side: Side, pnl_percent: f64) -> Option<f64> {
        let next_state = self.observe(candles).ok().and_then(|(_, state)| state);
        let updated = self.learn(next_state.as_ref(), Some(side), Some(pnl_percent));
        self.end_episode();
        updated
    }

    /// Forget the pending transition
    pub fn end_episode(&mut self) {
        self.last_state = None;
        self.last_action = None;
    }

    /// Stop distance tier from win rate
    pub fn adjust_stop_loss(&mut self, symbol: &str, performance: &PerformanceSummary) -> f64 {
        self.stop_loss_pct = if performance.win_rate > 0.7 {
            0.8
        } else if performance.win_rate < 0.3 {
            1.2
        } else {
            1.0
        };
        debug!(symbol, win_rate = performance.win_rate, stop_loss_pct = self.stop_loss_pct, "stop loss tuned");
        self.stop_loss_pct
    }

    /// Target distance tier from profit/loss ratio
    pub fn adjust_take_profit(&mut self, symbol: &str, performance: &PerformanceSummary) -> f64 {
        self.take_profit_pct = if performance.profit_loss_ratio > 2.0 {
            2.5
        } else if performance.profit_loss_ratio < 0.5 {
            1.5
        } else {
            2.0
        };
        debug!(
            symbol,
            profit_loss_ratio = performance.profit_loss_ratio,
            take_profit_pct = self.take_profit_pct,
            "take profit tuned"
        );
        self.take_profit_pct
    }

    /// Decay exploration with experience. Never raises epsilon.
    pub fn adjust_learning_parameters(&mut self, total_trades: u64) -> f64 {
        let target = if total_trades > 100 {
            0.1
        } else if total_trades > 50 {
            0.15
        } else {
            self.epsilon
        };
        self.epsilon = self.epsilon.min(target);
        self.epsilon
    }

    /// Apply all performance-driven tuning at once
    pub fn apply_performance(&mut self, symbol: &str, performance: &PerformanceSummary) {
        self.adjust_stop_loss(symbol, performance);
        self.adjust_take_profit(symbol, performance);
        self.adjust_learning_parameters(performance.total_trades);
        info!(
            symbol,
            strategy = %self.config.name,
            stop_loss_pct = self.stop_loss_pct,
            take_profit_pct = self.take_profit_pct,
            epsilon = self.epsilon,
            "engine tuned from performance"
        );
    }

    /// Serialize the learned table
    pub fn save_model(&self) -> Result<String> {
        self.q_table.to_json()
    }

    /// Replace the learned table; other engine fields keep their values
    pub fn load_model(&mut self, blob: &str) -> Result<()> {
        self.q_table.load_json(blob)?;
        info!(strategy = %self.config.name, states = self.q_table.len(), "model loaded");
        Ok(())
    }

    fn evaluate_entry(&mut self, candles: &[Candle], symbol: &str) -> Result<Option<TradeSignal>> {
        let (indicators, state) = self.observe(candles)?;
        let Some(state) = state else {
            return Ok(None);
        };

        // Nothing is held while scanning for entries
        self.learn(Some(&state), None, None);
        let action = self.decide(&state);

        let Some(side) = action.as_side() else {
            return Ok(None);
        };

        let last = candles
            .last()
            .ok_or_else(|| QTradeError::IndicatorUnavailable("empty candle window".into()))?;
        let (stop_loss, take_profit) = protective_levels(
            side,
            last.close,
            pct_decimal(self.stop_loss_pct),
            pct_decimal(self.take_profit_pct),
        );

        let signal = TradeSignal {
            symbol: symbol.to_string(),
            side,
            confidence: self.q_table.q_value(&state, action),
            reference_price: last.close,
            stop_loss,
            take_profit,
            generated_at: last.timestamp,
            metadata: SignalMetadata {
                strategy_name: self.config.name.clone(),
                timeframe: self.config.timeframe,
                indicators,
                state,
            },
        };

        info!(
            symbol,
            side = %signal.side,
            state = %signal.metadata.state,
            confidence = %format!("{:.4}", signal.confidence),
            price = %signal.reference_price,
            "entry signal"
        );
        Ok(Some(signal))
    }

    fn evaluate_exit(&mut self, candles: &[Candle], position: &Position) -> Result<bool> {
        let (_, state) = self.observe(candles)?;
        let Some(state) = state else {
            return Ok(false);
        };

        self.learn(Some(&state), Some(position.side), position.pnl_percent_f64());
        let action = self.decide(&state);

        let exit = action.as_side() == Some(position.side.opposite());
        if exit {
            info!(symbol = %position.symbol, side = %position.side, state = %state, "strategy exit signal");
        }
        Ok(exit)
    }

    /// Indicators and state key over the trailing window
    fn observe(&self, candles: &[Candle]) -> Result<(IndicatorSnapshot, Option<StateKey>)> {
        let start = candles.len().saturating_sub(self.config.window);
        let indicators = IndicatorSnapshot::compute(&candles[start..])?;
        let state = self.encoder.encode(&indicators);
        Ok((indicators, state))
    }

    /// Credit the pending transition with a reward and `next_state`
    fn learn(&mut self, next_state: Option<&StateKey>, side: Option<Side>, pnl: Option<f64>) -> Option<f64> {
        let action = self.last_action?;
        let reward = self.reward_fn.compute(&RewardTransition {
            action,
            position_side: side,
            pnl_percent: pnl,
        });
        self.q_table
            .update(self.last_state.as_ref(), action, reward, next_state)
    }

    fn decide(&mut self, state: &StateKey) -> Action {
        let action = self.q_table.best_action(state, self.epsilon, &mut self.rng);
        self.last_state = Some(state.clone());
        self.last_action = Some(action);
        action
    }
}

fn pct_decimal(pct: f64) -> Decimal {
    match Decimal::from_f64(pct) {
        Some(d) => d.round_dp(8).normalize(),
        None => {
            warn!(pct, "unrepresentable percentage, using 0");
            Decimal::ZERO
        }
    }
}
