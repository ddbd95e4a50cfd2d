//! RL Configuration
//!
//! Configuration structs for the tabular learner and its reward shaping.

use serde::{Deserialize, Serialize};

/// Q-learning hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    /// Learning rate
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Discount factor
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Exploration rate for epsilon-greedy selection
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_alpha() -> f64 {
    0.3
}

fn default_gamma() -> f64 {
    0.7
}

fn default_epsilon() -> f64 {
    0.2
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            gamma: default_gamma(),
            epsilon: default_epsilon(),
        }
    }
}

impl QLearningConfig {
    /// Collect out-of-range hyperparameters
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.alpha) || self.alpha == 0.0 {
            errors.push("learning.alpha must be in (0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.gamma) {
            errors.push("learning.gamma must be in [0, 1)".to_string());
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            errors.push("learning.epsilon must be in [0, 1]".to_string());
        }
        errors
    }
}

/// Reward function configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Multiplier applied to a positive realized PnL percentage
    #[serde(default = "default_profit_multiplier")]
    pub profit_multiplier: f64,
    /// Multiplier applied to a non-positive realized PnL percentage
    #[serde(default = "default_loss_multiplier")]
    pub loss_multiplier: f64,
    /// Reward for an action agreeing with the open position
    #[serde(default = "default_alignment_reward")]
    pub alignment_reward: f64,
    /// Penalty for an action opposing the open position
    #[serde(default = "default_opposition_penalty")]
    pub opposition_penalty: f64,
}

fn default_profit_multiplier() -> f64 {
    10.0
}

fn default_loss_multiplier() -> f64 {
    5.0
}

fn default_alignment_reward() -> f64 {
    0.1
}

fn default_opposition_penalty() -> f64 {
    0.1
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            profit_multiplier: default_profit_multiplier(),
            loss_multiplier: default_loss_multiplier(),
            alignment_reward: default_alignment_reward(),
            opposition_penalty: default_opposition_penalty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hyperparameters() {
        let cfg = QLearningConfig::default();
        assert_eq!(cfg.alpha, 0.3);
        assert_eq!(cfg.gamma, 0.7);
        assert_eq!(cfg.epsilon, 0.2);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn out_of_range_values_are_reported() {
        let cfg = QLearningConfig {
            alpha: 0.0,
            gamma: 1.0,
            epsilon: 1.5,
        };
        assert_eq!(cfg.validate().len(), 3);
    }
}
