pub mod adapters;
pub mod backtest;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod live;
pub mod rl;
pub mod strategy;

pub use backtest::{BacktestConfig, BacktestSimulator, BacktestStats, TrainingSummary};
pub use config::AppConfig;
pub use error::{QTradeError, Result};
pub use live::{CycleReport, LiveConfig, LiveCycleController};
pub use strategy::{
    EngineConfig, EnginePool, EngineScope, ExitReason, Position, PositionLifecycle,
    StrategyEngine, TradeSignal,
};
