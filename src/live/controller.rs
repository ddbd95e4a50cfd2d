//! One polling pass over open positions and the watchlist
//!
//! A cycle runs three phases in order: exits for every open position, entries
//! for watched symbols without one, then model persistence. A failure on one
//! symbol is logged and recorded in the report; the pass moves on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::{notify_quietly, MarketDataSource, ModelStore, Notifier, OrderExecution};
use crate::domain::{Candle, OrderSide, OrderSpec, Timeframe};
use crate::error::{QTradeError, Result};
use crate::strategy::{EnginePool, Position, PositionLifecycle};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub timeframe: Timeframe,
    /// Candles requested per symbol each cycle
    pub candle_count: usize,
    /// Symbols with fewer candles are skipped for the cycle
    pub min_candles: usize,
    /// Concurrent open positions, 0 for no limit
    pub max_positions: usize,
    /// Quote amount committed per entry
    pub allocation_usd: Decimal,
    pub watchlist: Vec<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M15,
            candle_count: 100,
            min_candles: 20,
            max_positions: 3,
            allocation_usd: Decimal::ONE_HUNDRED,
            watchlist: Vec::new(),
        }
    }
}

/// What a cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub positions_checked: usize,
    pub closed: Vec<Position>,
    pub opened: Vec<Position>,
    /// Symbols skipped for thin candle history
    pub skipped: Vec<String>,
    /// `(symbol, reason)` for every isolated failure
    pub failures: Vec<(String, String)>,
    pub models_saved: usize,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            positions_checked: 0,
            closed: Vec::new(),
            opened: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            models_saved: 0,
        }
    }

    fn fail(&mut self, symbol: &str, phase: &str, error: &QTradeError) {
        warn!(symbol, phase, error = %error, "symbol step failed");
        self.failures.push((symbol.to_string(), format!("{}: {}", phase, error)));
    }
}

enum StepOutcome {
    Skipped,
    Idle,
    Closed(Position),
    Opened(Position),
}

pub struct LiveCycleController {
    config: LiveConfig,
    pool: EnginePool,
    market: Arc<dyn MarketDataSource>,
    execution: Arc<dyn OrderExecution>,
    store: Arc<dyn ModelStore>,
    notifier: Arc<dyn Notifier>,
    positions: HashMap<String, Position>,
}

impl LiveCycleController {
    pub fn new(
        config: LiveConfig,
        pool: EnginePool,
        market: Arc<dyn MarketDataSource>,
        execution: Arc<dyn OrderExecution>,
        store: Arc<dyn ModelStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            pool,
            market,
            execution,
            store,
            notifier,
            positions: HashMap::new(),
        }
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EnginePool {
        &mut self.pool
    }

    /// Take over an already open position. One per symbol.
    pub fn adopt_position(&mut self, position: Position) -> Result<()> {
        if !position.is_open() {
            return Err(QTradeError::Validation(format!(
                "position {} for {} is not open",
                position.id, position.symbol
            )));
        }
        if self.positions.contains_key(&position.symbol) {
            return Err(QTradeError::Validation(format!(
                "{} already has an open position",
                position.symbol
            )));
        }
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Open positions sorted by symbol
    pub fn open_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    fn at_capacity(&self) -> bool {
        self.config.max_positions > 0 && self.positions.len() >= self.config.max_positions
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::new(Utc::now());

        let mut open: Vec<String> = self.positions.keys().cloned().collect();
        open.sort();
        for symbol in open {
            report.positions_checked += 1;
            match self.check_exit(&symbol).await {
                Ok(StepOutcome::Closed(position)) => report.closed.push(position),
                Ok(StepOutcome::Skipped) => report.skipped.push(symbol),
                Ok(_) => {}
                Err(e) => report.fail(&symbol, "exit", &e),
            }
        }

        for symbol in self.config.watchlist.clone() {
            if self.positions.contains_key(&symbol) {
                continue;
            }
            if self.at_capacity() {
                info!(
                    open = self.positions.len(),
                    max = self.config.max_positions,
                    "max positions reached, entry scan stopped"
                );
                break;
            }
            match self.try_enter(&symbol).await {
                Ok(StepOutcome::Opened(position)) => report.opened.push(position),
                Ok(StepOutcome::Skipped) => report.skipped.push(symbol),
                Ok(_) => {}
                Err(e) => report.fail(&symbol, "entry", &e),
            }
        }

        for symbol in &self.config.watchlist {
            match self.pool.persist(symbol, self.store.as_ref()).await {
                Ok(true) => report.models_saved += 1,
                Ok(false) => {}
                Err(e) => report.fail(symbol, "persist", &e),
            }
        }

        info!(
            checked = report.positions_checked,
            closed = report.closed.len(),
            opened = report.opened.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            models_saved = report.models_saved,
            "cycle complete"
        );
        report
    }

    async fn recent_candles(&self, symbol: &str) -> Result<Option<Vec<Candle>>> {
        let candles = self
            .market
            .get_candles(symbol, self.config.timeframe, self.config.candle_count, None)
            .await?;
        if candles.len() < self.config.min_candles {
            debug!(symbol, have = candles.len(), need = self.config.min_candles, "not enough candles");
            return Ok(None);
        }
        Ok(Some(candles))
    }

    async fn check_exit(&mut self, symbol: &str) -> Result<StepOutcome> {
        let Some(candles) = self.recent_candles(symbol).await? else {
            return Ok(StepOutcome::Skipped);
        };
        let position = self
            .positions
            .get(symbol)
            .cloned()
            .ok_or_else(|| QTradeError::Internal(format!("no open position for {}", symbol)))?;
        let price = self.execution.current_price(symbol).await?;

        let engine = self.pool.prepare(symbol, self.store.as_ref()).await;
        let Some(decision) = PositionLifecycle::new(engine).evaluate(&position, price, &candles) else {
            return Ok(StepOutcome::Idle);
        };

        let order = OrderSpec::close_market(symbol, position.side, position.quantity);
        let handle = self.execution.place_market_order(&order).await?;
        let exit_price = handle.fill_price.unwrap_or(price);

        let mut closed = position;
        closed.close(exit_price, decision.reason, Utc::now())?;
        self.positions.remove(symbol);

        PositionLifecycle::new(self.pool.engine_for(symbol)).settle(&candles, &closed);

        let pnl = closed.pnl_percent_f64().unwrap_or(0.0);
        if let Err(e) = self
            .store
            .record_trade_result(symbol, self.pool.strategy_name(), closed.is_win(), pnl)
            .await
        {
            warn!(symbol, error = %e, "trade result not recorded");
        }

        info!(
            symbol,
            side = %closed.side,
            reason = %decision.reason,
            entry = %closed.entry_price,
            exit = %exit_price,
            pnl_percent = %format!("{:.2}", pnl),
            "position closed"
        );
        notify_quietly(
            self.notifier.as_ref(),
            &format!(
                "Closed {} {} at {} ({}), PnL {:.2}%",
                closed.side, symbol, exit_price, decision.reason, pnl
            ),
        )
        .await;

        Ok(StepOutcome::Closed(closed))
    }

    async fn try_enter(&mut self, symbol: &str) -> Result<StepOutcome> {
        let Some(candles) = self.recent_candles(symbol).await? else {
            return Ok(StepOutcome::Skipped);
        };

        let engine = self.pool.prepare(symbol, self.store.as_ref()).await;
        let Some(signal) = engine.check_entry_signal(&candles, symbol) else {
            return Ok(StepOutcome::Idle);
        };

        let price = self.execution.current_price(symbol).await?;
        if price <= Decimal::ZERO {
            return Err(QTradeError::InvalidMarketData(format!("non-positive price {} for {}", price, symbol)));
        }

        let allocation = self.config.allocation_usd;
        let balance = self.execution.available_balance().await?;
        if balance < allocation {
            return Err(QTradeError::Validation(format!(
                "insufficient balance {} for allocation {}",
                balance, allocation
            )));
        }

        let quantity = self.execution.round_quantity(symbol, allocation / price);
        if quantity <= Decimal::ZERO {
            return Err(QTradeError::Validation(format!(
                "allocation {} rounds to zero quantity at {}",
                allocation, price
            )));
        }

        let order = OrderSpec::market(symbol, OrderSide::opening(signal.side), quantity);
        let handle = self.execution.place_market_order(&order).await?;
        let entry_price = handle.fill_price.unwrap_or(price);

        let mut position = Position::open(&signal, entry_price, allocation, quantity, Utc::now());
        position.stop_loss = self.execution.round_price(symbol, position.stop_loss);
        position.take_profit = self.execution.round_price(symbol, position.take_profit);

        let stop = OrderSpec::stop_loss(symbol, position.side, quantity, position.stop_loss);
        if let Err(e) = self.execution.place_stop_loss_order(&stop).await {
            warn!(symbol, error = %e, "stop loss order rejected");
        }
        let target = OrderSpec::take_profit(symbol, position.side, quantity, position.take_profit);
        if let Err(e) = self.execution.place_take_profit_order(&target).await {
            warn!(symbol, error = %e, "take profit order rejected");
        }

        info!(
            symbol,
            side = %position.side,
            entry = %entry_price,
            quantity = %quantity,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            "position opened"
        );
        notify_quietly(
            self.notifier.as_ref(),
            &format!(
                "Opened {} {} at {} (SL {}, TP {})",
                position.side, symbol, entry_price, position.stop_loss, position.take_profit
            ),
        )
        .await;

        self.positions.insert(symbol.to_string(), position.clone());
        Ok(StepOutcome::Opened(position))
    }
}
