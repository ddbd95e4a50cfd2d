//! Reinforcement Learning Module
//!
//! Tabular Q-learning used by the strategy engine.
//!
//! # Features
//!
//! - **State Representation**: Bollinger position x RSI zone labels
//! - **Action Space**: Long / Short / Hold
//! - **Algorithm**: one-step Q-learning with epsilon-greedy exploration
//! - **Persistence**: the table serializes to an opaque JSON blob

pub mod config;
pub mod core;
pub mod q_table;

// Config exports
pub use config::{QLearningConfig, RewardConfig};

// Core exports
pub use core::{
    Action, BandRsiEncoder, PositionRewardFunction, PriceBucket, RewardFunction,
    RewardTransition, RsiBucket, StateEncoder, StateKey, NUM_ACTIONS,
};

pub use q_table::{ActionValues, QTable};
