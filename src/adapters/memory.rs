//! In-process collaborators for paper trading, backtests and tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::traits::{MarketDataSource, ModelStore, OrderExecution, TimeRange};
use crate::domain::{Candle, OrderHandle, OrderSpec, Timeframe};
use crate::error::{QTradeError, Result};
use crate::strategy::{PerformanceSummary, TradeLedger};

type StoreKey = (String, String);

fn store_key(symbol: &str, strategy: &str) -> StoreKey {
    (symbol.to_string(), strategy.to_string())
}

/// Last `count` candles of an ordered series, restricted to `range`
pub fn tail_in_range(candles: &[Candle], count: usize, range: Option<TimeRange>) -> Vec<Candle> {
    let selected: Vec<&Candle> = candles
        .iter()
        .filter(|c| range.map(|r| r.contains(c.timestamp)).unwrap_or(true))
        .collect();
    let start = selected.len().saturating_sub(count);
    selected[start..].iter().map(|c| (*c).clone()).collect()
}

/// Model blobs and trade ledgers held in memory
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<StoreKey, String>>,
    ledgers: RwLock<HashMap<StoreKey, TradeLedger>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger recorded for a `(symbol, strategy)` pair
    pub async fn ledger(&self, symbol: &str, strategy: &str) -> Option<TradeLedger> {
        self.ledgers.read().await.get(&store_key(symbol, strategy)).cloned()
    }

    /// Symbols that have a stored model under `strategy`, sorted
    pub async fn model_symbols(&self, strategy: &str) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .models
            .read()
            .await
            .keys()
            .filter(|(_, s)| s == strategy)
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn load_model(&self, symbol: &str, strategy: &str) -> Result<Option<String>> {
        Ok(self.models.read().await.get(&store_key(symbol, strategy)).cloned())
    }

    async fn save_model(&self, symbol: &str, strategy: &str, blob: &str) -> Result<()> {
        self.models
            .write()
            .await
            .insert(store_key(symbol, strategy), blob.to_string());
        Ok(())
    }

    async fn record_trade_result(
        &self,
        symbol: &str,
        strategy: &str,
        is_win: bool,
        pnl_percent: f64,
    ) -> Result<()> {
        self.ledgers
            .write()
            .await
            .entry(store_key(symbol, strategy))
            .or_default()
            .record(is_win, pnl_percent);
        Ok(())
    }

    async fn strategy_performance(&self, symbol: &str, strategy: &str) -> Result<Option<PerformanceSummary>> {
        Ok(self
            .ledgers
            .read()
            .await
            .get(&store_key(symbol, strategy))
            .filter(|l| l.total_trades() > 0)
            .map(TradeLedger::summary))
    }
}

/// Fixed candle series per `(symbol, timeframe)`
#[derive(Debug, Default)]
pub struct StaticMarketData {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.series
            .get_mut()
            .insert((symbol.to_string(), timeframe), candles);
        self
    }

    /// Replace a series
    pub async fn set_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>> {
        let series = self.series.read().await;
        let candles = series
            .get(&(symbol.to_string(), timeframe))
            .map(|c| tail_in_range(c, count, range))
            .unwrap_or_default();
        Ok(candles)
    }
}

/// Dry-run execution that fills every order at the current price.
///
/// Prices come from explicit overrides first, then from the close of the
/// latest candle of the attached market data source.
pub struct PaperExecution {
    balance: Decimal,
    prices: RwLock<HashMap<String, Decimal>>,
    market: Option<(Arc<dyn MarketDataSource>, Timeframe)>,
    orders: RwLock<Vec<OrderSpec>>,
}

impl PaperExecution {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            prices: RwLock::new(HashMap::new()),
            market: None,
            orders: RwLock::new(Vec::new()),
        }
    }

    /// Price symbols from the latest candle of `market`
    pub fn with_market(mut self, market: Arc<dyn MarketDataSource>, timeframe: Timeframe) -> Self {
        self.market = Some((market, timeframe));
        self
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Every order accepted so far, in placement order
    pub async fn orders(&self) -> Vec<OrderSpec> {
        self.orders.read().await.clone()
    }

    async fn accept(&self, order: &OrderSpec) -> Result<OrderHandle> {
        let fill_price = match order.trigger_price {
            Some(_) => None,
            None => Some(self.current_price(&order.symbol).await?),
        };
        self.orders.write().await.push(order.clone());

        let handle = OrderHandle {
            order_id: format!("paper-{}", Uuid::new_v4()),
            client_order_id: order.client_order_id.clone(),
            fill_price,
        };
        info!(
            symbol = %order.symbol,
            side = %order.order_side,
            order_type = ?order.order_type,
            quantity = %order.quantity,
            trigger = ?order.trigger_price,
            fill = ?fill_price,
            "[PAPER] order accepted"
        );
        Ok(handle)
    }
}

#[async_trait]
impl OrderExecution for PaperExecution {
    async fn current_price(&self, symbol: &str) -> Result<Decimal> {
        if let Some(price) = self.prices.read().await.get(symbol) {
            return Ok(*price);
        }

        let Some((market, timeframe)) = &self.market else {
            return Err(QTradeError::MarketDataUnavailable(format!("no price for {}", symbol)));
        };
        let candles = market.get_candles(symbol, *timeframe, 1, None).await?;
        let price = candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| QTradeError::MarketDataUnavailable(format!("no candles for {}", symbol)))?;
        debug!(symbol, %price, "paper price from latest candle");
        Ok(price)
    }

    async fn available_balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn place_market_order(&self, order: &OrderSpec) -> Result<OrderHandle> {
        self.accept(order).await
    }

    async fn place_stop_loss_order(&self, order: &OrderSpec) -> Result<OrderHandle> {
        self.accept(order).await
    }

    async fn place_take_profit_order(&self, order: &OrderSpec) -> Result<OrderHandle> {
        self.accept(order).await
    }
}
