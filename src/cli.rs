//! Command line interface and output formatting
//!
//! Supports two output modes: human-readable tables (default) and JSON (--json).

use clap::{Parser, Subcommand};
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::backtest::{BacktestStats, TrainingSummary};
use crate::live::CycleReport;
use crate::rl::QTable;
use crate::strategy::Position;

#[derive(Parser)]
#[command(name = "qtrade")]
#[command(version = "0.1.0")]
#[command(about = "Tabular Q-learning trading agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus $QTRADE_ENV overrides)
    #[arg(short, long, default_value = "config", env = "QTRADE_CONFIG_DIR")]
    pub config: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train on archived candles for the watchlist
    Train {
        /// Comma-separated symbols (default: watchlist, then every archived symbol)
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Days to replay per symbol
        #[arg(short, long)]
        days: Option<usize>,
    },
    /// Replay archived candles for one symbol
    Backtest {
        symbol: String,
        /// Days to replay
        #[arg(short, long)]
        days: Option<usize>,
    },
    /// Run a paper-trading cycle over the candle archive
    Cycle {
        /// Keep running on the configured interval until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },
    /// Show the stored Q-table for a symbol
    Model { symbol: String },
}

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
pub struct StatsRow {
    pub symbol: String,
    pub days: usize,
    pub skipped: usize,
    pub trades: u64,
    pub wins: u64,
    pub win_rate: String,
    pub pl_ratio: String,
    pub pnl_pct: String,
}

impl From<&BacktestStats> for StatsRow {
    fn from(stats: &BacktestStats) -> Self {
        Self {
            symbol: stats.symbol.clone(),
            days: stats.days_processed,
            skipped: stats.days_skipped + stats.days_failed,
            trades: stats.total_trades,
            wins: stats.wins,
            win_rate: format!("{:.1}%", stats.win_rate * 100.0),
            pl_ratio: format!("{:.2}", stats.profit_loss_ratio),
            pnl_pct: format!("{:+.2}", stats.total_pnl_percent),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct TradeRow {
    pub symbol: String,
    pub side: String,
    pub entry: String,
    pub exit: String,
    pub reason: String,
    pub pnl_pct: String,
    pub opened_at: String,
}

impl From<&Position> for TradeRow {
    fn from(position: &Position) -> Self {
        let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        Self {
            symbol: position.symbol.clone(),
            side: position.side.to_string(),
            entry: position.entry_price.to_string(),
            exit: opt(position.exit_price.map(|p| p.to_string())),
            reason: opt(position.exit_reason.map(|r| r.to_string())),
            pnl_pct: opt(position.pnl_percent.map(|p| format!("{:+.2}", p))),
            opened_at: position.opened_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct QRow {
    pub state: String,
    pub long: String,
    pub short: String,
    pub hold: String,
    pub greedy: String,
}

pub fn print_training_summary(summary: &TrainingSummary, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    let rows: Vec<StatsRow> = summary.symbols.iter().map(StatsRow::from).collect();
    print_items(&rows, mode)?;
    println!(
        "total trades: {}  wins: {}  win rate: {:.1}%  p/l ratio: {:.2}",
        summary.total_trades,
        summary.wins,
        summary.win_rate * 100.0,
        summary.profit_loss_ratio
    );
    Ok(())
}

pub fn print_backtest(stats: &BacktestStats, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    print_items(&[StatsRow::from(stats)], mode)?;
    let trades: Vec<TradeRow> = stats.trades.iter().map(TradeRow::from).collect();
    print_items(&trades, mode)
}

pub fn print_cycle_report(report: &CycleReport, open: &[&Position], mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let closed: Vec<TradeRow> = report.closed.iter().map(TradeRow::from).collect();
    if !closed.is_empty() {
        println!("closed:");
        print_items(&closed, mode)?;
    }
    println!("open:");
    let open: Vec<TradeRow> = open.iter().map(|p| TradeRow::from(*p)).collect();
    print_items(&open, mode)?;
    for (symbol, reason) in &report.failures {
        println!("failed {symbol}: {reason}");
    }
    Ok(())
}

pub fn q_rows(table: &QTable) -> Vec<QRow> {
    table
        .iter()
        .map(|(state, values)| QRow {
            state: state.to_string(),
            long: format!("{:.4}", values.long),
            short: format!("{:.4}", values.short),
            hold: format!("{:.4}", values.hold),
            greedy: values.greedy().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::StateKey;

    #[test]
    fn test_train_symbols_split_on_commas() {
        let cli = Cli::parse_from(["qtrade", "train", "--symbols", "BTCUSDT,ETHUSDT", "--days", "5"]);
        match cli.command {
            Commands::Train { symbols, days } => {
                assert_eq!(symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
                assert_eq!(days, Some(5));
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_json_flag_is_global() {
        let cli = Cli::parse_from(["qtrade", "cycle", "--watch", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Cycle { watch: true }));
    }

    #[test]
    fn test_q_rows_sorted_by_state() {
        let mut table = QTable::default();
        table.entry(&StateKey::from("2_1")).short = 0.5;
        table.entry(&StateKey::from("-1_0")).long = 1.25;

        let rows = q_rows(&table);
        assert_eq!(rows[0].state, "-1_0");
        assert_eq!(rows[0].long, "1.2500");
        assert_eq!(rows[0].greedy, "long");
        assert_eq!(rows[1].greedy, "short");
    }
}
