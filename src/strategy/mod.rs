//! Strategy module
//!
//! Q-learning strategy engine and the position life cycle it drives.
//!
//! - `indicators` - Bollinger bands, RSI and ATR over a candle window
//! - `engine` - entry/exit evaluation, learning and risk tuning
//! - `lifecycle` - exit arbitration between hard levels and the strategy
//! - `pool` - shared or per-symbol engines

pub mod engine;
pub mod indicators;
pub mod lifecycle;
pub mod performance;
pub mod pool;
pub mod position;
pub mod signal;

pub use engine::{EngineConfig, StrategyEngine};
pub use indicators::{BollingerBands, IndicatorSnapshot};
pub use lifecycle::{ExitDecision, PositionLifecycle};
pub use performance::{PerformanceSummary, TradeLedger};
pub use pool::{EnginePool, EngineScope};
pub use position::{pnl_percent, ExitReason, Position, PositionStatus};
pub use signal::{protective_levels, SignalMetadata, TradeSignal};
