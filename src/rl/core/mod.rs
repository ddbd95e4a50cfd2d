//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{Action, NUM_ACTIONS};
pub use reward::{PositionRewardFunction, RewardFunction, RewardTransition};
pub use state::{BandRsiEncoder, PriceBucket, RsiBucket, StateEncoder, StateKey};
