use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

use crate::backtest::BacktestConfig;
use crate::domain::Timeframe;
use crate::live::LiveConfig;
use crate::rl::{QLearningConfig, RewardConfig};
use crate::strategy::indicators::BOLLINGER_PERIOD;
use crate::strategy::{EngineConfig, EnginePool, EngineScope};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub learning: QLearningConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    /// Symbols scanned for entries and trained by default
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name, half of every persistence key
    #[serde(default = "default_strategy_name")]
    pub name: String,
    /// Candle interval the live cycle trades on
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Trailing candles fed to the indicators
    #[serde(default = "default_window")]
    pub window: usize,
    /// Candles fetched per symbol each live cycle
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,
    /// One engine for the whole watchlist, or one per symbol
    #[serde(default)]
    pub scope: EngineScope,
    /// Fixed exploration seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_strategy_name() -> String {
    "qlearning".to_string()
}

fn default_window() -> usize {
    20
}

fn default_candle_count() -> usize {
    100
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: default_strategy_name(),
            timeframe: Timeframe::default(),
            window: default_window(),
            candle_count: default_candle_count(),
            scope: EngineScope::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Initial stop distance in percent, retuned from performance
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Initial target distance in percent, retuned from performance
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Max concurrent positions, 0 for no limit
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Quote amount committed per entry
    #[serde(default = "default_allocation_usd")]
    pub allocation_usd: Decimal,
}

fn default_stop_loss_pct() -> f64 {
    1.0
}

fn default_take_profit_pct() -> f64 {
    2.0
}

fn default_max_positions() -> usize {
    3 // Max 3 concurrent positions
}

fn default_allocation_usd() -> Decimal {
    dec!(100)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_positions: default_max_positions(),
            allocation_usd: default_allocation_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    /// Days replayed per symbol
    #[serde(default = "default_backtest_days")]
    pub days: usize,
    #[serde(default)]
    pub intraday_timeframe: Timeframe,
    /// Days with fewer intraday bars are skipped
    #[serde(default = "default_min_intraday_bars")]
    pub min_intraday_bars: usize,
    #[serde(default = "default_max_intraday_bars")]
    pub max_intraday_bars: usize,
}

fn default_backtest_days() -> usize {
    30
}

fn default_min_intraday_bars() -> usize {
    20
}

fn default_max_intraday_bars() -> usize {
    96
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            days: default_backtest_days(),
            intraday_timeframe: Timeframe::default(),
            min_intraday_bars: default_min_intraday_bars(),
            max_intraday_bars: default_max_intraday_bars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Candle archive directory (`{SYMBOL}_{timeframe}.csv`)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Model and trade ledger directory
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_model_dir() -> String {
    "state".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            model_dir: default_model_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Seconds between live cycles in watch mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Quote balance reported by paper execution
    #[serde(default = "default_paper_balance_usd")]
    pub paper_balance_usd: Decimal,
}

fn default_interval_secs() -> u64 {
    900
}

fn default_paper_balance_usd() -> Decimal {
    dec!(10000)
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            paper_balance_usd: default_paper_balance_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Daily rolling log file directory, console only when unset
    #[serde(default = "default_log_dir")]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> Option<String> {
    Some("logs".to_string())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: default_log_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("cycle.interval_secs", 900)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("QTRADE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (QTRADE_RISK__MAX_POSITIONS, etc.)
            .add_source(
                Environment::with_prefix("QTRADE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("watchlist")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            name: self.strategy.name.clone(),
            timeframe: self.strategy.timeframe,
            window: self.strategy.window,
            stop_loss_pct: self.risk.stop_loss_pct,
            take_profit_pct: self.risk.take_profit_pct,
            learning: self.learning,
            reward: self.reward,
        }
    }

    /// Engine pool for this configuration's scope and seed
    pub fn engine_pool(&self) -> EnginePool {
        let pool = EnginePool::new(self.strategy.scope, self.engine_config());
        match self.strategy.seed {
            Some(seed) => pool.with_seed(seed),
            None => pool,
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            timeframe: self.strategy.timeframe,
            candle_count: self.strategy.candle_count,
            min_candles: self.strategy.window,
            max_positions: self.risk.max_positions,
            allocation_usd: self.risk.allocation_usd,
            watchlist: self.watchlist.clone(),
        }
    }

    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            intraday_timeframe: self.backtest.intraday_timeframe,
            window: self.strategy.window,
            min_intraday_bars: self.backtest.min_intraday_bars,
            max_intraday_bars: self.backtest.max_intraday_bars,
            allocation_usd: self.risk.allocation_usd,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.strategy.name.trim().is_empty() {
            errors.push("strategy.name must not be empty".to_string());
        }

        if self.strategy.window < BOLLINGER_PERIOD {
            errors.push(format!(
                "strategy.window must be at least {} (Bollinger period)",
                BOLLINGER_PERIOD
            ));
        }

        if self.strategy.candle_count < self.strategy.window {
            errors.push("strategy.candle_count must be >= strategy.window".to_string());
        }

        errors.extend(self.learning.validate());

        // Validate risk params
        if self.risk.stop_loss_pct <= 0.0 || self.risk.stop_loss_pct >= 100.0 {
            errors.push("risk.stop_loss_pct must be between 0 and 100".to_string());
        }

        if self.risk.take_profit_pct <= 0.0 {
            errors.push("risk.take_profit_pct must be positive".to_string());
        }

        if self.risk.allocation_usd <= Decimal::ZERO {
            errors.push("risk.allocation_usd must be positive".to_string());
        }

        // Validate backtest params
        if self.backtest.days == 0 {
            errors.push("backtest.days must be positive".to_string());
        }

        if self.backtest.max_intraday_bars < self.backtest.min_intraday_bars {
            errors.push("backtest.max_intraday_bars must be >= backtest.min_intraday_bars".to_string());
        }

        if self.backtest.max_intraday_bars < self.strategy.window {
            errors.push("backtest.max_intraday_bars must be >= strategy.window".to_string());
        }

        if self.cycle.interval_secs == 0 {
            errors.push("cycle.interval_secs must be positive".to_string());
        }

        if self.watchlist.iter().any(|s| s.trim().is_empty()) {
            errors.push("watchlist contains an empty symbol".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.strategy.scope, EngineScope::Shared);
        assert_eq!(cfg.risk.max_positions, 3);
        assert_eq!(cfg.backtest.max_intraday_bars, 96);
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let mut cfg = AppConfig::default();
        cfg.strategy.window = 10;
        cfg.risk.allocation_usd = Decimal::ZERO;
        cfg.learning.epsilon = 2.0;
        cfg.cycle.interval_secs = 0;

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
watchlist = ["BTCUSDT", "ETHUSDT"]

[strategy]
name = "bands"
timeframe = "1h"
scope = "per_symbol"
seed = 7

[learning]
epsilon = 0.05

[risk]
max_positions = 5
allocation_usd = "250.5"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(cfg.watchlist, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(cfg.strategy.timeframe, Timeframe::H1);
        assert_eq!(cfg.strategy.scope, EngineScope::PerSymbol);
        assert_eq!(cfg.learning.epsilon, 0.05);
        assert_eq!(cfg.learning.alpha, 0.3);
        assert_eq!(cfg.risk.allocation_usd, dec!(250.5));

        let live = cfg.live_config();
        assert_eq!(live.max_positions, 5);
        assert_eq!(cfg.engine_pool().strategy_name(), "bands");
        assert_eq!(cfg.engine_pool().scope(), EngineScope::PerSymbol);
        assert_eq!(cfg.backtest_config().window, 20);
    }
}
