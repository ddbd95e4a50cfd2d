//! Reward Functions
//!
//! Scalar rewards attributed to the most recent action.

use crate::domain::Side;
use crate::rl::core::action::Action;

// Re-export config
pub use crate::rl::config::RewardConfig;

/// Information needed to compute a reward
#[derive(Debug, Clone, Copy)]
pub struct RewardTransition {
    /// The action being rewarded
    pub action: Action,
    /// Side of the position held while the action applied, if any
    pub position_side: Option<Side>,
    /// Realized PnL percentage when the position just closed
    pub pnl_percent: Option<f64>,
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward from a state transition
    fn compute(&self, transition: &RewardTransition) -> f64;
}

/// Position-aware reward
///
/// Realized PnL dominates once a trade closes; otherwise the agent gets a small
/// nudge for agreeing (or disagreeing) with the position it holds.
#[derive(Debug, Clone, Default)]
pub struct PositionRewardFunction {
    config: RewardConfig,
}

impl PositionRewardFunction {
    /// Create with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: RewardConfig) -> Self {
        Self { config }
    }
}

impl RewardFunction for PositionRewardFunction {
    fn compute(&self, transition: &RewardTransition) -> f64 {
        let Some(side) = transition.position_side else {
            return 0.0;
        };

        if let Some(pnl) = transition.pnl_percent {
            // Gains scale steeper than losses
            return if pnl > 0.0 {
                pnl * self.config.profit_multiplier
            } else {
                pnl * self.config.loss_multiplier
            };
        }

        match transition.action.as_side() {
            Some(s) if s == side => self.config.alignment_reward,
            Some(_) => -self.config.opposition_penalty,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(action: Action, side: Option<Side>, pnl: Option<f64>) -> f64 {
        PositionRewardFunction::new().compute(&RewardTransition {
            action,
            position_side: side,
            pnl_percent: pnl,
        })
    }

    #[test]
    fn test_no_position_is_neutral() {
        assert_eq!(reward(Action::Long, None, None), 0.0);
        assert_eq!(reward(Action::Short, None, Some(5.0)), 0.0);
    }

    #[test]
    fn test_realized_pnl_is_asymmetric() {
        assert_eq!(reward(Action::Hold, Some(Side::Long), Some(2.0)), 20.0);
        assert_eq!(reward(Action::Hold, Some(Side::Long), Some(-2.0)), -10.0);
        assert_eq!(reward(Action::Long, Some(Side::Long), Some(0.0)), 0.0);
    }

    #[test]
    fn test_direction_consistency() {
        assert_eq!(reward(Action::Long, Some(Side::Long), None), 0.1);
        assert_eq!(reward(Action::Short, Some(Side::Long), None), -0.1);
        assert_eq!(reward(Action::Short, Some(Side::Short), None), 0.1);
        assert_eq!(reward(Action::Hold, Some(Side::Short), None), 0.0);
    }
}
