//! Offline training over archived candles

pub mod simulator;

pub use simulator::{BacktestConfig, BacktestSimulator, BacktestStats, TrainingSummary};
