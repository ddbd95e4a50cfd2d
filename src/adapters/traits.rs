//! Collaborator seams used by the live controller and the backtester

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Candle, OrderHandle, OrderSpec, Timeframe};
use crate::error::Result;
use crate::strategy::PerformanceSummary;

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Historical and recent candles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Up to `count` most recent candles, oldest first, optionally inside `range`
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>>;
}

/// Order placement and account queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderExecution: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<Decimal>;

    /// Free quote balance
    async fn available_balance(&self) -> Result<Decimal>;

    async fn place_market_order(&self, order: &OrderSpec) -> Result<OrderHandle>;

    async fn place_stop_loss_order(&self, order: &OrderSpec) -> Result<OrderHandle>;

    async fn place_take_profit_order(&self, order: &OrderSpec) -> Result<OrderHandle>;

    /// Round a base quantity to the venue's lot size
    fn round_quantity(&self, _symbol: &str, quantity: Decimal) -> Decimal {
        quantity.round_dp(6)
    }

    /// Round a price to the venue's tick size
    fn round_price(&self, _symbol: &str, price: Decimal) -> Decimal {
        price.round_dp(8)
    }
}

/// Model blobs and trade outcome history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn load_model(&self, symbol: &str, strategy: &str) -> Result<Option<String>>;

    async fn save_model(&self, symbol: &str, strategy: &str, blob: &str) -> Result<()>;

    async fn record_trade_result(
        &self,
        symbol: &str,
        strategy: &str,
        is_win: bool,
        pnl_percent: f64,
    ) -> Result<()>;

    /// `None` until the first trade is recorded
    async fn strategy_performance(&self, symbol: &str, strategy: &str) -> Result<Option<PerformanceSummary>>;
}

/// Human-facing messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Send a message, logging instead of failing
pub async fn notify_quietly(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message).await {
        warn!(error = %e, "notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QTradeError;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_range_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + Duration::days(1));
        assert!(range.contains(start));
        assert!(range.contains(start + Duration::hours(23)));
        assert!(!range.contains(start + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_notify_quietly_swallows_errors() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(QTradeError::collaborator("notifier", "offline")));
        notify_quietly(&notifier, "hello").await;
    }
}
