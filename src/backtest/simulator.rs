//! Day-by-day replay of archived candles through the strategy
//!
//! Every archived day is replayed bar by bar over a sliding window. Entries
//! fill at the close of the bar after the signal, exits are arbitrated by the
//! position life cycle, and anything still open at the end of a day is closed
//! at the last close. The model is saved once per replayed day.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::{MarketDataSource, ModelStore, TimeRange};
use crate::domain::{Candle, Timeframe};
use crate::strategy::{
    EnginePool, ExitReason, Position, PositionLifecycle, TradeLedger, TradeSignal,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub intraday_timeframe: Timeframe,
    /// Sliding window length fed to the engine
    pub window: usize,
    /// Days with fewer intraday bars are skipped
    pub min_intraday_bars: usize,
    /// Intraday bars requested per day
    pub max_intraday_bars: usize,
    /// Notional used to size simulated positions
    pub allocation_usd: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            intraday_timeframe: Timeframe::M15,
            window: 20,
            min_intraday_bars: 20,
            max_intraday_bars: 96,
            allocation_usd: Decimal::ONE_HUNDRED,
        }
    }
}

/// Outcome of replaying one symbol
#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestStats {
    pub symbol: String,
    pub days_processed: usize,
    /// Days with too few intraday bars
    pub days_skipped: usize,
    /// Days aborted by a market data failure
    pub days_failed: usize,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub total_pnl_percent: f64,
    pub ledger: TradeLedger,
    pub trades: Vec<Position>,
}

impl BacktestStats {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, position: Position) {
        let pnl = position.pnl_percent_f64().unwrap_or(0.0);
        self.ledger.record(position.is_win(), pnl);
        self.total_pnl_percent += pnl;
        self.trades.push(position);
    }

    fn finish(mut self) -> Self {
        let summary = self.ledger.summary();
        self.total_trades = summary.total_trades;
        self.wins = self.ledger.wins;
        self.losses = self.ledger.losses;
        self.win_rate = summary.win_rate;
        self.profit_loss_ratio = summary.profit_loss_ratio;
        self
    }
}

/// Watchlist-wide roll-up of backtest results
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingSummary {
    pub symbols: Vec<BacktestStats>,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
}

impl TrainingSummary {
    pub fn from_stats(symbols: Vec<BacktestStats>) -> Self {
        let mut ledger = TradeLedger::new();
        for stats in &symbols {
            ledger.merge(&stats.ledger);
        }
        let summary = ledger.summary();
        Self {
            symbols,
            total_trades: summary.total_trades,
            wins: ledger.wins,
            losses: ledger.losses,
            win_rate: summary.win_rate,
            profit_loss_ratio: summary.profit_loss_ratio,
        }
    }
}

pub struct BacktestSimulator {
    config: BacktestConfig,
    pool: EnginePool,
    market: Arc<dyn MarketDataSource>,
    store: Arc<dyn ModelStore>,
}

impl BacktestSimulator {
    pub fn new(
        config: BacktestConfig,
        pool: EnginePool,
        market: Arc<dyn MarketDataSource>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        Self {
            config,
            pool,
            market,
            store,
        }
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EnginePool {
        &mut self.pool
    }

    /// Replay the last `days` archived days of `symbol`
    pub async fn run(&mut self, symbol: &str, days: usize) -> BacktestStats {
        let mut stats = BacktestStats::new(symbol);

        let daily = match self.market.get_candles(symbol, Timeframe::D1, days, None).await {
            Ok(daily) => daily,
            Err(e) => {
                warn!(symbol, error = %e, "daily candles unavailable, backtest aborted");
                return stats.finish();
            }
        };
        if daily.is_empty() {
            warn!(symbol, "no daily candles in archive");
            return stats.finish();
        }

        self.pool.prepare(symbol, self.store.as_ref()).await;
        info!(symbol, days = daily.len(), "backtest started");

        for day in &daily {
            let range = TimeRange::new(day.timestamp, day.timestamp + Duration::days(1));
            let bars = match self
                .market
                .get_candles(
                    symbol,
                    self.config.intraday_timeframe,
                    self.config.max_intraday_bars,
                    Some(range),
                )
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol, day = %day.timestamp.date_naive(), error = %e, "intraday fetch failed, day aborted");
                    stats.days_failed += 1;
                    continue;
                }
            };

            if bars.len() < self.config.min_intraday_bars.max(self.config.window) {
                debug!(symbol, day = %day.timestamp.date_naive(), bars = bars.len(), "day skipped");
                stats.days_skipped += 1;
                continue;
            }

            let trades_before = stats.trades.len();
            self.replay_day(symbol, &bars, &mut stats).await;
            stats.days_processed += 1;

            if let Err(e) = self.pool.persist(symbol, self.store.as_ref()).await {
                warn!(symbol, error = %e, "model save failed");
            }
            debug!(
                symbol,
                day = %day.timestamp.date_naive(),
                trades = stats.trades.len() - trades_before,
                "day replayed"
            );
        }

        let stats = stats.finish();
        info!(
            symbol,
            days = stats.days_processed,
            skipped = stats.days_skipped,
            trades = stats.total_trades,
            win_rate = %format!("{:.1}%", stats.win_rate * 100.0),
            profit_loss_ratio = %format!("{:.2}", stats.profit_loss_ratio),
            "backtest complete"
        );
        stats
    }

    /// Replay every symbol and roll the results up
    pub async fn train_watchlist(&mut self, symbols: &[String], days: usize) -> TrainingSummary {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            results.push(self.run(symbol, days).await);
        }
        let summary = TrainingSummary::from_stats(results);
        info!(
            symbols = summary.symbols.len(),
            trades = summary.total_trades,
            win_rate = %format!("{:.1}%", summary.win_rate * 100.0),
            profit_loss_ratio = %format!("{:.2}", summary.profit_loss_ratio),
            "training complete"
        );
        summary
    }

    async fn replay_day(&mut self, symbol: &str, bars: &[Candle], stats: &mut BacktestStats) {
        let window = self.config.window.max(1);
        let mut open: Option<Position> = None;
        let mut pending_entry: Option<TradeSignal> = None;

        for i in (window - 1)..bars.len() {
            let slice = &bars[i + 1 - window..=i];
            let bar = &bars[i];

            if let Some(signal) = pending_entry.take() {
                open = self.open_position(&signal, bar);
                continue;
            }

            match open.take() {
                Some(position) => {
                    let decision = PositionLifecycle::new(self.pool.engine_for(symbol)).evaluate(
                        &position,
                        bar.close,
                        slice,
                    );
                    match decision {
                        Some(decision) => {
                            self.close_position(
                                symbol,
                                position,
                                decision.reference_price,
                                decision.reason,
                                bar,
                                slice,
                                stats,
                            )
                            .await
                        }
                        None => open = Some(position),
                    }
                }
                None => {
                    pending_entry = self.pool.engine_for(symbol).check_entry_signal(slice, symbol);
                }
            }
        }

        if let (Some(position), Some(last)) = (open, bars.last()) {
            let slice = &bars[bars.len() - window..];
            self.close_position(
                symbol,
                position,
                last.close,
                ExitReason::ForcedEndOfPeriod,
                last,
                slice,
                stats,
            )
            .await;
        }
    }

    fn open_position(&self, signal: &TradeSignal, bar: &Candle) -> Option<Position> {
        if bar.close <= Decimal::ZERO {
            warn!(symbol = %signal.symbol, price = %bar.close, "non-positive fill price, entry dropped");
            return None;
        }
        let allocation = self.config.allocation_usd;
        let position = Position::open(signal, bar.close, allocation, allocation / bar.close, bar.timestamp);
        debug!(
            symbol = %signal.symbol,
            side = %position.side,
            entry = %position.entry_price,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            "simulated entry"
        );
        Some(position)
    }

    #[allow(clippy::too_many_arguments)]
    async fn close_position(
        &mut self,
        symbol: &str,
        mut position: Position,
        exit_price: Decimal,
        reason: ExitReason,
        bar: &Candle,
        slice: &[Candle],
        stats: &mut BacktestStats,
    ) {
        if let Err(e) = position.close(exit_price, reason, bar.timestamp) {
            warn!(symbol, error = %e, "simulated close rejected");
            return;
        }

        PositionLifecycle::new(self.pool.engine_for(symbol)).settle(slice, &position);

        let pnl = position.pnl_percent_f64().unwrap_or(0.0);
        if let Err(e) = self
            .store
            .record_trade_result(symbol, self.pool.strategy_name(), position.is_win(), pnl)
            .await
        {
            warn!(symbol, error = %e, "trade result not recorded");
        }
        debug!(
            symbol,
            side = %position.side,
            %reason,
            exit = %exit_price,
            pnl_percent = %format!("{:.2}", pnl),
            "simulated exit"
        );
        stats.record(position);
    }
}
